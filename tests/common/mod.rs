//! An in-process stand-in for Tor's SOCKS listener.
//!
//! Targets are routed by name:
//! - `echo.test`, or any loopback IP: relayed to a local echo server
//! - `whoami.test`: answers with the exit address of the circuit the
//!   stream's credentials map to
//! - `redirect.test`: answers any request with an HTTP 301
//! - `refused.test`: CONNECT fails with status 0x05
//! - `badatyp.test`: CONNECT reply carries address type 0x02
//! - `stall.test`: never replies, reports when the client hangs up
//!
//! RESOLVE knows `known.test` and `v6.test`; RESOLVE_PTR knows
//! `93.184.216.34`. Everything else gets status 0x04.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use torsocks::TorSocks5Config;

pub const KNOWN_ADDR: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);
pub const KNOWN_V6_ADDR: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);

pub const REDIRECT_RESPONSE: &[u8] =
    b"HTTP/1.1 301 Moved Permanently\r\nLocation: https://redirect.test/\r\nContent-Length: 0\r\n\r\n";

#[derive(Default)]
struct State {
    /// Credentials seen per connection, `None` for anonymous ones.
    credentials: Mutex<Vec<Option<Vec<u8>>>>,
    /// Emulated circuits keyed by credential.
    circuits: Mutex<HashMap<Option<Vec<u8>>, usize>>,
}

impl State {
    fn exit_for(&self, username: &Option<Vec<u8>>) -> Ipv4Addr {
        let mut circuits = self.circuits.lock().unwrap();
        let next = circuits.len() + 1;
        let circuit = *circuits.entry(username.clone()).or_insert(next);
        Ipv4Addr::new(10, 0, 0, circuit as u8)
    }
}

pub struct FakeTor {
    pub addr: SocketAddr,
    pub echo_addr: SocketAddr,
    state: Arc<State>,
    stalled_closed: mpsc::UnboundedReceiver<()>,
}

impl FakeTor {
    pub async fn start() -> Self {
        let echo_addr = start_echo().await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State::default());
        let (closed_tx, stalled_closed) = mpsc::unbounded_channel();

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let (conn, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let state = server_state.clone();
                let closed_tx = closed_tx.clone();
                tokio::spawn(async move {
                    let _ = serve(conn, state, echo_addr, closed_tx).await;
                });
            }
        });

        Self {
            addr,
            echo_addr,
            state,
            stalled_closed,
        }
    }

    pub fn config(&self) -> TorSocks5Config {
        TorSocks5Config::new(self.addr)
    }

    pub fn credentials(&self) -> Vec<Option<Vec<u8>>> {
        self.state.credentials.lock().unwrap().clone()
    }

    /// Resolves once a stalled connection has been closed by the client.
    pub async fn stalled_connection_closed(&mut self) -> Option<()> {
        self.stalled_closed.recv().await
    }
}

async fn start_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0; 4096];
                loop {
                    match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

enum Dest {
    Ip(IpAddr, u16),
    Name(String, u16),
}

async fn serve(
    mut conn: TcpStream,
    state: Arc<State>,
    echo_addr: SocketAddr,
    closed_tx: mpsc::UnboundedSender<()>,
) -> io::Result<()> {
    let mut head = [0; 2];
    conn.read_exact(&mut head).await?;
    let mut methods = vec![0; head[1] as usize];
    conn.read_exact(&mut methods).await?;

    let username = if methods.contains(&0x02) {
        conn.write_all(&[0x05, 0x02]).await?;
        let _version = conn.read_u8().await?;
        let ulen = conn.read_u8().await? as usize;
        let mut username = vec![0; ulen];
        conn.read_exact(&mut username).await?;
        let plen = conn.read_u8().await? as usize;
        let mut password = vec![0; plen];
        conn.read_exact(&mut password).await?;
        conn.write_all(&[0x01, 0x00]).await?;
        Some(username)
    } else {
        conn.write_all(&[0x05, 0x00]).await?;
        None
    };
    state.credentials.lock().unwrap().push(username.clone());

    let mut request = [0; 4];
    conn.read_exact(&mut request).await?;
    let dest = match request[3] {
        0x01 => {
            let mut ip = [0; 4];
            conn.read_exact(&mut ip).await?;
            Dest::Ip(Ipv4Addr::from(ip).into(), conn.read_u16().await?)
        }
        0x03 => {
            let len = conn.read_u8().await? as usize;
            let mut name = vec![0; len];
            conn.read_exact(&mut name).await?;
            let name = String::from_utf8_lossy(&name).into_owned();
            Dest::Name(name, conn.read_u16().await?)
        }
        0x04 => {
            let mut ip = [0; 16];
            conn.read_exact(&mut ip).await?;
            Dest::Ip(Ipv6Addr::from(ip).into(), conn.read_u16().await?)
        }
        _ => return reply_v4(&mut conn, 0x08, Ipv4Addr::UNSPECIFIED).await,
    };

    match (request[1], dest) {
        (0x01, dest) => connect(conn, &state, &username, dest, echo_addr, closed_tx).await,
        (0xf0, Dest::Name(name, _)) => match name.as_str() {
            "known.test" => reply_v4(&mut conn, 0x00, KNOWN_ADDR).await,
            "v6.test" => {
                let mut reply = vec![0x05, 0x00, 0x00, 0x04];
                reply.extend_from_slice(&KNOWN_V6_ADDR.octets());
                reply.extend_from_slice(&[0, 0]);
                conn.write_all(&reply).await
            }
            _ => reply_v4(&mut conn, 0x04, Ipv4Addr::UNSPECIFIED).await,
        },
        (0xf1, Dest::Ip(IpAddr::V4(ip), _)) if ip == KNOWN_ADDR => {
            let name = b"known.test";
            let mut reply = vec![0x05, 0x00, 0x00, 0x03, name.len() as u8];
            reply.extend_from_slice(name);
            reply.extend_from_slice(&[0, 0]);
            conn.write_all(&reply).await
        }
        (0xf0, _) | (0xf1, _) => reply_v4(&mut conn, 0x04, Ipv4Addr::UNSPECIFIED).await,
        _ => reply_v4(&mut conn, 0x07, Ipv4Addr::UNSPECIFIED).await,
    }
}

async fn connect(
    mut conn: TcpStream,
    state: &State,
    username: &Option<Vec<u8>>,
    dest: Dest,
    echo_addr: SocketAddr,
    closed_tx: mpsc::UnboundedSender<()>,
) -> io::Result<()> {
    let name = match dest {
        Dest::Ip(ip, port) if ip.is_loopback() => {
            let upstream = TcpStream::connect((ip, port)).await;
            return relay(conn, upstream).await;
        }
        Dest::Ip(..) => return reply_v4(&mut conn, 0x03, Ipv4Addr::UNSPECIFIED).await,
        Dest::Name(name, _) => name,
    };

    match name.as_str() {
        "echo.test" => {
            let upstream = TcpStream::connect(echo_addr).await;
            relay(conn, upstream).await
        }
        "whoami.test" => {
            let exit = state.exit_for(username);
            reply_v4(&mut conn, 0x00, exit).await?;
            let mut buf = [0; 1024];
            let _ = conn.read(&mut buf).await?;
            let body = format!("HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n{}", exit);
            conn.write_all(body.as_bytes()).await
        }
        "redirect.test" => {
            reply_v4(&mut conn, 0x00, Ipv4Addr::new(10, 0, 0, 99)).await?;
            let mut buf = [0; 1024];
            let _ = conn.read(&mut buf).await?;
            conn.write_all(REDIRECT_RESPONSE).await
        }
        "refused.test" => reply_v4(&mut conn, 0x05, Ipv4Addr::UNSPECIFIED).await,
        "badatyp.test" => conn.write_all(&[0x05, 0x00, 0x00, 0x02, 0, 0, 0, 0]).await,
        "stall.test" => {
            let mut buf = [0; 64];
            while let Ok(n) = conn.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = closed_tx.send(());
            Ok(())
        }
        _ => reply_v4(&mut conn, 0x04, Ipv4Addr::UNSPECIFIED).await,
    }
}

async fn relay(mut conn: TcpStream, upstream: io::Result<TcpStream>) -> io::Result<()> {
    let mut upstream = match upstream {
        Ok(upstream) => upstream,
        Err(_) => return reply_v4(&mut conn, 0x05, Ipv4Addr::UNSPECIFIED).await,
    };
    let bound = match upstream.local_addr()? {
        SocketAddr::V4(addr) => *addr.ip(),
        SocketAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    };
    reply_v4(&mut conn, 0x00, bound).await?;
    tokio::io::copy_bidirectional(&mut conn, &mut upstream).await?;
    Ok(())
}

async fn reply_v4(conn: &mut TcpStream, status: u8, addr: Ipv4Addr) -> io::Result<()> {
    let mut reply = vec![0x05, status, 0x00, 0x01];
    reply.extend_from_slice(&addr.octets());
    reply.extend_from_slice(&[0, 0]);
    conn.write_all(&reply).await
}
