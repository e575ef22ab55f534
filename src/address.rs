use std::fmt::{Display, Formatter};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::lookup_host;
use tokio::time::timeout;

use crate::error::{invalid_data, io_error};

pub const ATYP_IPV4: u8 = 1;
pub const ATYP_DOMAIN: u8 = 3;
pub const ATYP_IPV6: u8 = 4;

/// Upper bound of an encoded address: type, length, 255-byte name, port.
pub const MAX_ADDR_LEN: usize = 1 + 1 + 255 + 2;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    Domain(String, u16),
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4(s) => s.fmt(f),
            Self::V6(s) => s.fmt(f),
            Self::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

impl Address {
    /// Decodes a complete address record as produced by [`read_addr_buf`].
    pub fn from_wire(data: &[u8]) -> io::Result<Self> {
        let port = |rest: &[u8]| u16::from_be_bytes([rest[0], rest[1]]);

        match data.first() {
            Some(&ATYP_IPV4) if data.len() == 7 => {
                let mut ip = [0; 4];
                ip.copy_from_slice(&data[1..5]);
                Ok(Self::V4(SocketAddrV4::new(ip.into(), port(&data[5..]))))
            }
            Some(&ATYP_IPV6) if data.len() == 19 => {
                let mut ip = [0; 16];
                ip.copy_from_slice(&data[1..17]);
                Ok(Self::V6(SocketAddrV6::new(ip.into(), port(&data[17..]), 0, 0)))
            }
            Some(&ATYP_DOMAIN) if data.len() >= 4 && data.len() == 4 + data[1] as usize => {
                let len = data.len();
                let host = std::str::from_utf8(&data[2..len - 2])
                    .map_err(|_| invalid_data("invalid domain"))?;
                Ok(Self::Domain(host.to_owned(), port(&data[len - 2..])))
            }
            _ => Err(invalid_data("invalid address")),
        }
    }

    /// Resolves to a socket address usable for both TCP dialing and UDP sending.
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        match self {
            Self::V4(s) => Ok(SocketAddr::V4(*s)),
            Self::V6(s) => Ok(SocketAddr::V6(*s)),
            Self::Domain(host, port) => {
                let mut addrs = timeout(RESOLVE_TIMEOUT, lookup_host((host.as_str(), *port)))
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "resolve timeout"))??;
                addrs
                    .next()
                    .ok_or_else(|| io_error("no address resolved"))
            }
        }
    }
}

/// Reads one address record from `r` into the front of `buf` and returns its length.
pub async fn read_addr_buf<R>(r: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if buf.len() < MAX_ADDR_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "address buffer too small",
        ));
    }

    r.read_exact(&mut buf[..1]).await?;
    read_addr_tail(r, buf).await
}

/// Completes an address record whose type byte is already in `buf[0]`.
pub(crate) async fn read_addr_tail<R>(r: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let (filled, len) = match buf[0] {
        ATYP_IPV4 => (1, 1 + 4 + 2),
        ATYP_IPV6 => (1, 1 + 16 + 2),
        ATYP_DOMAIN => {
            r.read_exact(&mut buf[1..2]).await?;
            (2, 1 + 1 + buf[1] as usize + 2)
        }
        _ => return Err(invalid_data("invalid address type")),
    };
    r.read_exact(&mut buf[filled..len]).await?;

    Ok(len)
}

/// Writes `AddrType | IP | Port` so that it ends exactly at the end of `buf`.
///
/// IPv4-mapped IPv6 addresses are written in their IPv4 form.
pub fn put_socket_addr(buf: &mut [u8], addr: SocketAddr) -> usize {
    let end = buf.len();
    let ip = match addr.ip() {
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(ip),
        },
        ip => ip,
    };

    let len = match ip {
        IpAddr::V4(ip) => {
            let start = end - (1 + 4 + 2);
            buf[start] = ATYP_IPV4;
            buf[start + 1..start + 5].copy_from_slice(&ip.octets());
            1 + 4 + 2
        }
        IpAddr::V6(ip) => {
            let start = end - (1 + 16 + 2);
            buf[start] = ATYP_IPV6;
            buf[start + 1..start + 17].copy_from_slice(&ip.octets());
            1 + 16 + 2
        }
    };
    buf[end - 2..].copy_from_slice(&addr.port().to_be_bytes());

    len
}

/// Maps an IPv4 target onto an IPv6 socket's address family.
pub(crate) fn to_family(target: SocketAddr, local: &SocketAddr) -> SocketAddr {
    match (target, local) {
        (SocketAddr::V4(v4), SocketAddr::V6(_)) => {
            SocketAddr::new(IpAddr::V6(v4.ip().to_ipv6_mapped()), v4.port())
        }
        _ => target,
    }
}

pub(crate) const UNSPECIFIED_V6: SocketAddr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0);
pub(crate) const UNSPECIFIED_V4: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_ipv4_record() {
        let mut r: &[u8] = &[1, 127, 0, 0, 1, 0, 80, 0xd, 0xa];
        let mut buf = [0; MAX_ADDR_LEN];
        let n = read_addr_buf(&mut r, &mut buf).await.unwrap();
        assert_eq!(n, 7);
        assert_eq!(r, &[0xd, 0xa]);
        assert_eq!(
            Address::from_wire(&buf[..n]).unwrap(),
            Address::V4("127.0.0.1:80".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn read_domain_record() {
        let mut wire = vec![3, 11];
        wire.extend_from_slice(b"example.com");
        wire.extend_from_slice(&443u16.to_be_bytes());
        let mut r = wire.as_slice();
        let mut buf = [0; MAX_ADDR_LEN];
        let n = read_addr_buf(&mut r, &mut buf).await.unwrap();
        assert_eq!(n, wire.len());

        let addr = Address::from_wire(&buf[..n]).unwrap();
        assert_eq!(addr, Address::Domain("example.com".into(), 443));
        assert_eq!(addr.to_string(), "example.com:443");
    }

    #[tokio::test]
    async fn truncated_record_is_eof() {
        let mut r: &[u8] = &[4, 0, 0, 0];
        let mut buf = [0; MAX_ADDR_LEN];
        let err = read_addr_buf(&mut r, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn domain_without_length_is_eof() {
        let mut r: &[u8] = &[3];
        let mut buf = [0; MAX_ADDR_LEN];
        let err = read_addr_buf(&mut r, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn unknown_type_rejected() {
        let mut r: &[u8] = &[9, 0, 0, 0, 0, 0, 0];
        let mut buf = [0; MAX_ADDR_LEN];
        let err = read_addr_buf(&mut r, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn invalid_domain_rejected() {
        assert!(Address::from_wire(&[3, 2, 0xff, 0xfe, 0, 80]).is_err());
        assert!(Address::from_wire(&[1, 127, 0, 0]).is_err());
    }

    #[test]
    fn put_mapped_ipv4() {
        let mut buf = [0; 32];
        let addr: SocketAddr = "[::ffff:8.8.8.8]:53".parse().unwrap();
        let n = put_socket_addr(&mut buf, addr);
        assert_eq!(n, 7);
        assert_eq!(&buf[32 - n..], &[1, 8, 8, 8, 8, 0, 53]);
    }

    #[test]
    fn put_ipv6() {
        let mut buf = [0; 32];
        let addr: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        let n = put_socket_addr(&mut buf, addr);
        assert_eq!(n, 19);
        assert_eq!(buf[32 - n], ATYP_IPV6);
        assert_eq!(&buf[30..], &443u16.to_be_bytes());
    }

    #[test]
    fn family_mapping() {
        let target: SocketAddr = "127.0.0.1:53".parse().unwrap();
        assert_eq!(
            to_family(target, &UNSPECIFIED_V6),
            "[::ffff:127.0.0.1]:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(to_family(target, &UNSPECIFIED_V4), target);
    }

    #[tokio::test]
    async fn resolve_ip_forms() {
        let addr = Address::V6("[::1]:443".parse().unwrap());
        assert_eq!(addr.resolve().await.unwrap(), "[::1]:443".parse().unwrap());
    }
}
