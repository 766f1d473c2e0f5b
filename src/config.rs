//! Client configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::socks::DEFAULT_IDENTITY_LEN;

/// Tor's default SOCKS port.
pub const DEFAULT_TOR_SOCKS_PORT: u16 = 9050;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where the Tor SOCKS listener is and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TorSocks5Config {
    pub proxy_addr: SocketAddr,
    /// Upper bound on dialing the proxy.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    /// Upper bound on the SOCKS negotiation, including Tor building a
    /// circuit and reaching the target.
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Option<Duration>,
    /// Length of generated isolation usernames and passwords.
    pub identity_len: usize,
    /// Read buffer size used by `Socks5Tunnel::send`.
    pub receive_buffer_size: usize,
}

impl Default for TorSocks5Config {
    fn default() -> Self {
        Self {
            proxy_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_TOR_SOCKS_PORT)),
            connect_timeout: Some(Duration::from_secs(10)),
            handshake_timeout: Some(Duration::from_secs(120)),
            identity_len: DEFAULT_IDENTITY_LEN,
            receive_buffer_size: 8192,
        }
    }
}

impl TorSocks5Config {
    pub fn new(proxy_addr: SocketAddr) -> Self {
        Self {
            proxy_addr,
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=255).contains(&self.identity_len) {
            return Err(ConfigError::Invalid(format!(
                "identity_len must be between 1 and 255, got {}",
                self.identity_len
            )));
        }
        if self.receive_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "receive_buffer_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
