use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::socks::{Identity, Result, Socks5Error, Violation, VERSION};

/// Version of the username/password sub-negotiation (RFC 1929).
const AUTH_VERSION: u8 = 0x01;
const AUTH_SUCCESS: u8 = 0x00;
const NO_AUTHENTICATION: u8 = 0x00;
const USERNAME_PASSWORD: u8 = 0x02;
const NO_ACCEPTABLE_METHOD: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    NoAuthentication = NO_AUTHENTICATION,
    UsernamePassword = USERNAME_PASSWORD,
}

impl AuthMethod {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Runs method negotiation and, when an identity is given, the
/// username/password sub-negotiation. Returns the method the proxy chose.
///
/// On error the caller must drop the stream; it is left mid-handshake.
pub async fn handshake<S>(stream: &mut S, identity: Option<&Identity>) -> Result<AuthMethod>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+
    let mut greeting = vec![VERSION, 0x1, AuthMethod::NoAuthentication.code()];
    if identity.is_some() {
        greeting[1] = 0x2;
        greeting.push(AuthMethod::UsernamePassword.code());
    }
    stream.write_all(&greeting).await?;
    stream.flush().await?;

    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    let mut buf = [0; 2];
    stream.read_exact(&mut buf).await?;

    if buf[0] != VERSION {
        return Err(Violation::InvalidResponseVersion {
            expected: VERSION,
            actual: buf[0],
        }
        .into());
    }

    let method = match (buf[1], identity) {
        (NO_ACCEPTABLE_METHOD, _) => return Err(Socks5Error::UnsupportedAuthMethod(buf[1])),
        (NO_AUTHENTICATION, _) => AuthMethod::NoAuthentication,
        (USERNAME_PASSWORD, Some(identity)) => {
            authenticate(stream, identity).await?;
            AuthMethod::UsernamePassword
        }
        (other, _) => return Err(Socks5Error::UnsupportedAuthMethod(other)),
    };
    trace!(?method, "socks handshake complete");

    Ok(method)
}

// +----+------+----------+------+----------+
// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
// +----+------+----------+------+----------+
// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
// +----+------+----------+------+----------+
async fn authenticate<S>(stream: &mut S, identity: &Identity) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let username = identity.username();
    let password = identity.password();

    // Lengths were checked when the identity was built.
    let mut buf = Vec::with_capacity(3 + username.len() + password.len());
    buf.push(AUTH_VERSION);
    buf.push(username.len() as u8);
    buf.extend_from_slice(username);
    buf.push(password.len() as u8);
    buf.extend_from_slice(password);
    stream.write_all(&buf).await?;
    stream.flush().await?;

    // +----+--------+
    // |VER | STATUS |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    let mut reply = [0; 2];
    stream.read_exact(&mut reply).await?;

    if reply[0] != AUTH_VERSION {
        return Err(Violation::InvalidResponseVersion {
            expected: AUTH_VERSION,
            actual: reply[0],
        }
        .into());
    }
    if reply[1] != AUTH_SUCCESS {
        return Err(Socks5Error::AuthenticationFailed(reply[1]));
    }

    Ok(())
}
