use std::convert::TryFrom;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use byteorder::{ByteOrder, NetworkEndian};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::socks::{
    validate_domain, Command, ReplyCode, Result, Socks5Error, TargetAddr, Violation, VERSION,
};

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const SUCCEEDED: u8 = 0x00;

/// A command together with the address it operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    command: Command,
    target_addr: TargetAddr,
}

impl Request {
    pub fn connect(target_addr: TargetAddr) -> Self {
        Self {
            command: Command::Connect,
            target_addr,
        }
    }

    /// Tor's RESOLVE. The port is not used by the proxy.
    pub fn resolve(hostname: impl Into<String>) -> Self {
        Self {
            command: Command::Resolve,
            target_addr: TargetAddr::Domain(hostname.into(), 0),
        }
    }

    /// Tor's RESOLVE_PTR.
    pub fn resolve_ptr(addr: IpAddr) -> Self {
        Self {
            command: Command::ResolvePtr,
            target_addr: TargetAddr::Ip(SocketAddr::new(addr, 0)),
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn target_addr(&self) -> &TargetAddr {
        &self.target_addr
    }

    /// Serializes the request, rejecting addresses the wire format cannot
    /// carry.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Vec::<u8>::try_from(self)
    }
}

impl TryFrom<&Request> for Vec<u8> {
    type Error = Socks5Error;
    fn try_from(request: &Request) -> Result<Self> {
        use TargetAddr::*;
        let mut buf = Vec::with_capacity(262);

        // +----+-----+-------+------+----------+----------+
        // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        buf.push(VERSION);
        buf.push(request.command as u8);
        buf.push(0x00);

        match &request.target_addr {
            Ip(SocketAddr::V4(socket)) => {
                buf.push(ATYP_IPV4);
                buf.extend_from_slice(&socket.ip().octets());
            }
            Domain(domain, _) => {
                validate_domain(domain)?;
                buf.push(ATYP_DOMAIN);
                buf.push(domain.len() as u8);
                buf.extend_from_slice(domain.as_bytes());
            }
            Ip(SocketAddr::V6(socket)) => {
                buf.push(ATYP_IPV6);
                buf.extend_from_slice(&socket.ip().octets());
            }
        }

        let mut port = [0; 2];
        NetworkEndian::write_u16(&mut port, request.target_addr.port());
        buf.extend_from_slice(&port);

        Ok(buf)
    }
}

/// A successful command reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// CONNECT: the address the proxy bound for the tunnel.
    Bound(TargetAddr),
    /// RESOLVE: the address the hostname resolved to.
    Resolved(IpAddr),
    /// RESOLVE_PTR: the hostname the address resolved to.
    Hostname(String),
}

pub(crate) async fn send_request<S>(stream: &mut S, data: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

// +----+-----+-------+------+----------+----------+
// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
// +----+-----+-------+------+----------+----------+
// | 1  |  1  | X'00' |  1   | Variable |    2     |
// +----+-----+-------+------+----------+----------+
pub(crate) async fn recv_reply<S>(stream: &mut S, command: Command) -> Result<Reply>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0; 4];
    stream.read_exact(&mut header).await?;

    if header[0] != VERSION {
        return Err(Violation::InvalidResponseVersion {
            expected: VERSION,
            actual: header[0],
        }
        .into());
    }

    match header[1] {
        SUCCEEDED => {}
        code => {
            return Err(match ReplyCode::from_code(code) {
                Some(reply) => Socks5Error::ServerFailure(reply),
                None => Violation::UnassignedReply(code).into(),
            })
        }
    }

    if header[2] != 0x00 {
        return Err(Violation::InvalidReservedByte(header[2]).into());
    }

    let atyp = header[3];
    let addr = match atyp {
        ATYP_IPV4 => {
            let mut buf = [0; 4 + 2];
            stream.read_exact(&mut buf).await?;

            let mut ip = [0; 4];
            ip.copy_from_slice(&buf[..4]);
            let port = NetworkEndian::read_u16(&buf[4..]);
            TargetAddr::Ip(SocketAddr::new(Ipv4Addr::from(ip).into(), port))
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut buf = vec![0; len + 2];
            stream.read_exact(&mut buf).await?;

            let port = NetworkEndian::read_u16(&buf[len..]);
            buf.truncate(len);
            let domain = match String::from_utf8(buf) {
                Ok(domain) if !domain.is_empty() => domain,
                _ => return Err(Violation::InvalidHostname.into()),
            };
            TargetAddr::Domain(domain, port)
        }
        ATYP_IPV6 => {
            let mut buf = [0; 16 + 2];
            stream.read_exact(&mut buf).await?;

            let mut ip = [0; 16];
            ip.copy_from_slice(&buf[..16]);
            let port = NetworkEndian::read_u16(&buf[16..]);
            TargetAddr::Ip(SocketAddr::new(Ipv6Addr::from(ip).into(), port))
        }
        _ => return Err(Violation::InvalidAddressType(atyp).into()),
    };

    Ok(match (command, addr) {
        (Command::Connect, addr) => Reply::Bound(addr),
        (Command::Resolve, TargetAddr::Ip(addr)) => Reply::Resolved(addr.ip()),
        (Command::ResolvePtr, TargetAddr::Domain(hostname, _)) => Reply::Hostname(hostname),
        (command, _) => return Err(Violation::UnexpectedAddressType { command, atyp }.into()),
    })
}
