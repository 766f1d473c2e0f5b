use std::fmt;

use rand::distributions::Alphanumeric;
use rand::{CryptoRng, Rng};

use crate::socks::{Result, Socks5Error};

/// Length of the random username and password of an isolated request.
pub const DEFAULT_IDENTITY_LEN: usize = 21;

const MAX_CREDENTIAL_LEN: usize = 255;

/// A username/password pair presented to Tor for stream isolation.
///
/// Tor puts streams that authenticate with different credentials on
/// different circuits; the proxy never checks the values themselves.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl Identity {
    pub fn new(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        check_len("username", &username)?;
        check_len("password", &password)?;
        Ok(Self { username, password })
    }

    /// Draws a fresh identity of `len` alphanumeric characters per field.
    ///
    /// `len` is clamped to `1..=255`.
    pub fn random<R: Rng + CryptoRng>(rng: &mut R, len: usize) -> Self {
        let len = len.clamp(1, MAX_CREDENTIAL_LEN);
        let mut field = || -> Vec<u8> { (0..len).map(|_| rng.sample(Alphanumeric)).collect() };
        let username = field();
        let password = field();
        Self { username, password }
    }

    pub fn username(&self) -> &[u8] {
        &self.username
    }

    pub fn password(&self) -> &[u8] {
        &self.password
    }
}

fn check_len(field: &str, value: &[u8]) -> Result<()> {
    if value.is_empty() || value.len() > MAX_CREDENTIAL_LEN {
        return Err(Socks5Error::InvalidArgument(format!(
            "{} must be 1 to {} bytes long, got {}",
            field,
            MAX_CREDENTIAL_LEN,
            value.len()
        )));
    }
    Ok(())
}

// Credentials stay out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &format_args!("<{} bytes>", self.username.len()))
            .field("password", &format_args!("<{} bytes>", self.password.len()))
            .finish()
    }
}
