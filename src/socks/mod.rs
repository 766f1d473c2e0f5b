mod client;
mod error;
mod handshake;
mod identity;
mod manager;
mod stream;

pub use self::client::{Reply, Request};
pub use self::error::{ReplyCode, Result, Socks5Error, Violation};
pub use self::handshake::{handshake, AuthMethod};
pub use self::identity::{Identity, DEFAULT_IDENTITY_LEN};
pub use self::manager::{Connector, TcpConnector, TorSocks5Manager};
pub use self::stream::Socks5Tunnel;

use std::fmt;
use std::net::{IpAddr, SocketAddr};

pub const VERSION: u8 = 0x5;

/// Longest hostname a domain address field can carry.
pub const MAX_DOMAIN_LEN: usize = 255;

/// A destination as seen by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl TargetAddr {
    pub fn domain(host: impl Into<String>, port: u16) -> Self {
        TargetAddr::Domain(host.into(), port)
    }

    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Checks the constraints a domain address field imposes.
    pub fn validate(&self) -> Result<()> {
        match self {
            TargetAddr::Ip(_) => Ok(()),
            TargetAddr::Domain(domain, _) => validate_domain(domain),
        }
    }
}

pub(crate) fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Socks5Error::InvalidArgument("hostname is empty".into()));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(Socks5Error::InvalidArgument(format!(
            "hostname is {} bytes long, at most {} are allowed",
            domain.len(),
            MAX_DOMAIN_LEN
        )));
    }
    Ok(())
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl From<(IpAddr, u16)> for TargetAddr {
    fn from(addr: (IpAddr, u16)) -> Self {
        TargetAddr::Ip(addr.into())
    }
}

impl From<(&str, u16)> for TargetAddr {
    fn from((host, port): (&str, u16)) -> Self {
        TargetAddr::domain(host, port)
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => addr.fmt(f),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

/// Request kinds, including Tor's resolver extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect = 0x01,
    Resolve = 0xf0,
    ResolvePtr = 0xf1,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Connect => "CONNECT",
            Command::Resolve => "RESOLVE",
            Command::ResolvePtr => "RESOLVE_PTR",
        })
    }
}
