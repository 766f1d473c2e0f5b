//! A SOCKS5 client for Tor's SOCKS listener: tunnels, name resolution
//! through Tor, and per-request stream isolation.

pub mod config;
pub mod socks;

pub use crate::config::{ConfigError, TorSocks5Config};
pub use crate::socks::{Socks5Error, Socks5Tunnel, TargetAddr, TorSocks5Manager};
