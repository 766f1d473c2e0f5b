use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::trace;

use crate::socks::TargetAddr;

/// A byte stream to `target`, negotiated through the proxy.
///
/// Bytes are passed through untouched in both directions. The connection
/// closes on [`release`](Socks5Tunnel::release) or on drop, whichever
/// comes first.
#[derive(Debug)]
pub struct Socks5Tunnel<S = TcpStream> {
    stream: Option<S>,
    target: TargetAddr,
    bound_addr: TargetAddr,
    receive_buffer_size: usize,
}

impl<S> Socks5Tunnel<S> {
    pub(crate) fn new(
        stream: S,
        target: TargetAddr,
        bound_addr: TargetAddr,
        receive_buffer_size: usize,
    ) -> Self {
        Socks5Tunnel {
            stream: Some(stream),
            target,
            bound_addr,
            receive_buffer_size,
        }
    }

    pub fn target(&self) -> &TargetAddr {
        &self.target
    }

    /// The address the proxy reported binding. Informational only.
    pub fn bound_addr(&self) -> &TargetAddr {
        &self.bound_addr
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Gives up the tunnel and returns the raw stream, unless released.
    pub fn into_inner(mut self) -> Option<S> {
        self.stream.take()
    }

    fn stream_mut(&mut self) -> io::Result<&mut S> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "tunnel released"))
    }
}

impl<S> Socks5Tunnel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Writes `data`, then returns what the remote sent back: the first
    /// chunk to arrive plus anything already buffered behind it. An empty
    /// result means the remote closed the stream.
    pub async fn send(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; self.receive_buffer_size];
        let stream = self.stream_mut()?;

        stream.write_all(data).await?;
        stream.flush().await?;

        let mut response = Vec::new();
        let n = stream.read(&mut buf).await?;
        response.extend_from_slice(&buf[..n]);
        if n == 0 {
            return Ok(response);
        }

        // Drain without waiting for more.
        while let Some(read) = stream.read(&mut buf).now_or_never() {
            match read? {
                0 => break,
                n => response.extend_from_slice(&buf[..n]),
            }
        }

        Ok(response)
    }

    /// Closes the connection. Calling it again does nothing.
    pub async fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // The peer may already be gone; the stream is dropped either way.
            let _ = stream.shutdown().await;
            trace!(tunnel = %self.target, "tunnel released");
        }
    }
}

impl<S> AsyncRead for Socks5Tunnel<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.stream_mut() {
            Ok(stream) => Pin::new(stream).poll_read(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl<S> AsyncWrite for Socks5Tunnel<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.stream_mut() {
            Ok(stream) => Pin::new(stream).poll_write(cx, buf),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.stream_mut() {
            Ok(stream) => Pin::new(stream).poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.stream_mut() {
            Ok(stream) => Pin::new(stream).poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}
