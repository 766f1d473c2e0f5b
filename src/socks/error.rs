use std::fmt;
use std::io;

use thiserror::Error;

use crate::socks::Command;

pub type Result<T> = std::result::Result<T, Socks5Error>;

#[derive(Error, Debug)]
pub enum Socks5Error {
    /// The proxy could not be dialed. No SOCKS bytes were exchanged.
    #[error("failed to connect to the socks proxy: {0}")]
    ConnectFailed(#[source] io::Error),

    /// The proxy picked a method we never offered, or signaled 0xff.
    #[error("proxy selected an unsupported authentication method: {0:#04x}")]
    UnsupportedAuthMethod(u8),

    #[error("username/password authentication failed with status {0:#04x}")]
    AuthenticationFailed(u8),

    /// Rejected locally, before any network I/O took place.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("socks protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),

    /// A well-formed reply carrying a non-zero status.
    #[error("socks server failure ({code:#04x}): {0}", code = .0.code())]
    ServerFailure(ReplyCode),

    #[error("socks negotiation timed out")]
    Timeout,
}

impl From<io::Error> for Socks5Error {
    fn from(err: io::Error) -> Self {
        Socks5Error::ProtocolViolation(err.into())
    }
}

/// Malformed, truncated or unexpected bytes from the proxy.
#[derive(Error, Debug)]
pub enum Violation {
    #[error("invalid response version: expected {expected}, actual: {actual}")]
    InvalidResponseVersion { expected: u8, actual: u8 },

    #[error("invalid reserved byte: expected: 0, actual: {0}")]
    InvalidReservedByte(u8),

    #[error("invalid address type: {0:#04x}")]
    InvalidAddressType(u8),

    #[error("unassigned reply code: {0:#04x}")]
    UnassignedReply(u8),

    #[error("unexpected address type {atyp:#04x} in reply to {command}")]
    UnexpectedAddressType { command: Command, atyp: u8 },

    #[error("reply does not match the {0} request")]
    UnexpectedReply(Command),

    #[error("reply carries an empty or non-UTF-8 hostname")]
    InvalidHostname,

    #[error("stream closed before the message was complete")]
    Truncated,

    #[error("io error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for Violation {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Violation::Truncated,
            _ => Violation::Io(err),
        }
    }
}

/// Non-success status codes of a command reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    GeneralSocksServerFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl ReplyCode {
    /// Maps a failure status byte. `None` for success and unassigned values.
    pub fn from_code(code: u8) -> Option<Self> {
        use ReplyCode::*;
        Some(match code {
            0x01 => GeneralSocksServerFailure,
            0x02 => ConnectionNotAllowed,
            0x03 => NetworkUnreachable,
            0x04 => HostUnreachable,
            0x05 => ConnectionRefused,
            0x06 => TtlExpired,
            0x07 => CommandNotSupported,
            0x08 => AddressTypeNotSupported,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ReplyCode::*;
        f.write_str(match self {
            GeneralSocksServerFailure => "general socks server failure",
            ConnectionNotAllowed => "connection not allowed by ruleset",
            NetworkUnreachable => "network unreachable",
            HostUnreachable => "host unreachable",
            ConnectionRefused => "connection refused",
            TtlExpired => "ttl expired",
            CommandNotSupported => "command not supported",
            AddressTypeNotSupported => "address type not supported",
        })
    }
}
