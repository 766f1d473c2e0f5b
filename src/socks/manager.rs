use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::config::{ConfigError, TorSocks5Config};
use crate::socks::client::{recv_reply, send_request};
use crate::socks::{
    handshake, Command, Identity, Reply, Request, Result, Socks5Error, Socks5Tunnel, TargetAddr,
    Violation,
};

/// Dials the proxy. Each call must yield a fresh, unshared stream.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, proxy_addr: SocketAddr) -> io::Result<Self::Stream>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, proxy_addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(proxy_addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Entry point for talking to Tor's SOCKS listener.
///
/// Every operation dials its own connection, so a single manager can be
/// shared freely between tasks. Dropping an operation's future closes the
/// connection it was negotiating on.
#[derive(Debug, Clone)]
pub struct TorSocks5Manager<C = TcpConnector> {
    config: Arc<TorSocks5Config>,
    connector: C,
}

impl TorSocks5Manager<TcpConnector> {
    pub fn new(config: TorSocks5Config) -> std::result::Result<Self, ConfigError> {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C> TorSocks5Manager<C>
where
    C: Connector,
{
    /// Fails if `config` does not pass [`TorSocks5Config::validate`].
    pub fn with_connector(
        config: TorSocks5Config,
        connector: C,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            connector,
        })
    }

    pub fn config(&self) -> &TorSocks5Config {
        &self.config
    }

    /// Opens a tunnel to `target`. With `isolate_stream` the request gets
    /// its own credentials, which makes Tor use a separate circuit.
    pub async fn establish_tunnel(
        &self,
        target: impl Into<TargetAddr>,
        isolate_stream: bool,
    ) -> Result<Socks5Tunnel<C::Stream>> {
        let target = target.into();
        let request = Request::connect(target.clone());
        let (stream, reply) = self.negotiate(&request, isolate_stream).await?;

        match reply {
            Reply::Bound(bound_addr) => {
                debug!(%target, %bound_addr, "tunnel established");
                Ok(Socks5Tunnel::new(
                    stream,
                    target,
                    bound_addr,
                    self.config.receive_buffer_size,
                ))
            }
            _ => Err(unexpected_reply(Command::Connect)),
        }
    }

    /// Resolves `hostname` through Tor.
    pub async fn resolve(&self, hostname: &str, isolate_stream: bool) -> Result<IpAddr> {
        let request = Request::resolve(hostname);
        let (_stream, reply) = self.negotiate(&request, isolate_stream).await?;

        match reply {
            Reply::Resolved(addr) => {
                debug!(hostname, %addr, "resolved");
                Ok(addr)
            }
            _ => Err(unexpected_reply(Command::Resolve)),
        }
    }

    /// Looks up the hostname of `addr` through Tor.
    pub async fn reverse_resolve(&self, addr: IpAddr, isolate_stream: bool) -> Result<String> {
        let request = Request::resolve_ptr(addr);
        let (_stream, reply) = self.negotiate(&request, isolate_stream).await?;

        match reply {
            Reply::Hostname(hostname) => {
                debug!(%addr, %hostname, "reverse resolved");
                Ok(hostname)
            }
            _ => Err(unexpected_reply(Command::ResolvePtr)),
        }
    }

    /// Dials the proxy and runs one request on a fresh connection. The
    /// stream is only handed back after a successful reply; on error it is
    /// dropped here, which closes it.
    async fn negotiate(
        &self,
        request: &Request,
        isolate_stream: bool,
    ) -> Result<(C::Stream, Reply)> {
        // Validate before touching the network.
        let data = request.encode()?;
        let identity = if isolate_stream {
            Some(Identity::random(
                &mut rand::thread_rng(),
                self.config.identity_len,
            ))
        } else {
            None
        };

        let command = request.command();
        let proxy_addr = self.config.proxy_addr;
        trace!(
            %proxy_addr,
            %command,
            dest = %request.target_addr(),
            isolate_stream,
            "dialing socks proxy"
        );

        let dial = self.connector.connect(proxy_addr);
        let mut stream = with_timeout(self.config.connect_timeout, dial)
            .await
            .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))
            .map_err(Socks5Error::ConnectFailed)?;

        let exchange = async {
            handshake(&mut stream, identity.as_ref()).await?;
            drop(identity);
            send_request(&mut stream, &data).await?;
            recv_reply(&mut stream, command).await
        };
        let result = with_timeout(self.config.handshake_timeout, exchange)
            .await
            .unwrap_or(Err(Socks5Error::Timeout));

        match result {
            Ok(reply) => Ok((stream, reply)),
            Err(e) => {
                debug!(%command, error = %e, "socks negotiation failed, closing proxy connection");
                Err(e)
            }
        }
    }
}

/// Runs `future` to completion, or until `limit` elapses. `None` on timeout.
async fn with_timeout<F: Future>(limit: Option<Duration>, future: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

fn unexpected_reply(command: Command) -> Socks5Error {
    Violation::UnexpectedReply(command).into()
}
