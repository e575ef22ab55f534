#[cfg(target_family = "unix")]
use std::mem::{ManuallyDrop, MaybeUninit};
use std::net::SocketAddr;
#[cfg(target_family = "unix")]
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::sync::Arc;

#[cfg(target_family = "unix")]
use mio::net::TcpSocket;
use tokio::io;
use tokio::net::TcpStream;
use tokio::net::UdpSocket;

pub fn sha224(data: &[u8]) -> [u8; 28] {
    openssl::sha::sha224(data)
}

pub fn base64(data: &[u8]) -> String {
    openssl::base64::encode_block(data)
}

pub trait ToHex {
    fn to_hex(&self) -> String;
}

impl ToHex for [u8] {
    fn to_hex(&self) -> String {
        const CHARS: &[u8] = b"0123456789abcdef";

        let mut s = String::with_capacity(self.len() * 2);
        for &b in self {
            s.push(CHARS[(b >> 4) as usize] as char);
            s.push(CHARS[(b & 0xf) as usize] as char);
        }

        s
    }
}

#[derive(Debug)]
pub struct SendHalf<T>(Arc<T>);

#[derive(Debug)]
pub struct RecvHalf<T>(Arc<T>);

pub trait Split {
    fn split(self) -> (RecvHalf<Self>, SendHalf<Self>)
    where
        Self: Sized;
}

impl Split for UdpSocket {
    fn split(self) -> (RecvHalf<UdpSocket>, SendHalf<UdpSocket>) {
        let shared = Arc::new(self);
        let send = shared.clone();
        let recv = shared;
        (RecvHalf(recv), SendHalf(send))
    }
}

impl RecvHalf<UdpSocket> {
    pub async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf).await
    }
}

impl SendHalf<UdpSocket> {
    pub async fn send_to(&mut self, buf: &[u8], target: &SocketAddr) -> io::Result<usize> {
        self.0.send_to(buf, target).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }
}

#[cfg(target_family = "unix")]
pub fn set_rlimit_nofile(limit: libc::rlim_t) -> io::Result<()> {
    unsafe {
        let mut rlimit = MaybeUninit::uninit();
        if libc::getrlimit(libc::RLIMIT_NOFILE, rlimit.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut rlimit: libc::rlimit = rlimit.assume_init();

        if rlimit.rlim_cur < limit {
            rlimit.rlim_cur = limit.min(rlimit.rlim_max);
            if libc::setrlimit(libc::RLIMIT_NOFILE, &rlimit) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    Ok(())
}

#[cfg(target_family = "unix")]
pub fn set_tcp_keepalive(tcpstream: &TcpStream, keepalive: bool) -> io::Result<()> {
    // the fd stays owned by `tcpstream`
    let tcpsocket = ManuallyDrop::new(unsafe { TcpSocket::from_raw_fd(tcpstream.as_raw_fd()) });
    tcpsocket.set_keepalive(keepalive)
}

#[cfg(not(target_family = "unix"))]
pub fn set_tcp_keepalive(_tcpstream: &TcpStream, _keepalive: bool) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha224_hex() {
        assert_eq!(
            sha224(b"").to_hex(),
            "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f"
        );
    }

    #[test]
    fn base64_block() {
        assert_eq!(base64(b"hello"), "aGVsbG8=");
    }

    #[tokio::test]
    async fn udp_split_halves() {
        let (mut recv, mut send) = UdpSocket::bind("127.0.0.1:0").await.unwrap().split();
        let local = send.local_addr().unwrap();

        send.send_to(b"ping", &local).await.unwrap();
        let mut buf = [0; 8];
        let (n, from) = recv.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, local);
    }

    #[cfg(target_family = "unix")]
    #[tokio::test]
    async fn keepalive_on_connected_stream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        set_tcp_keepalive(&stream, true).unwrap();
        set_tcp_keepalive(&stream, false).unwrap();
        // still open after both calls
        assert!(stream.peer_addr().is_ok());
    }
}
