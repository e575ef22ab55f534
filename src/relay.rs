//! TCP splice and UDP-over-stream relays.
//!
//! Each relay runs the client-to-target direction on a spawned task and the
//! target-to-client direction on the calling task. A direction that stops
//! wakes its sibling through a [`Notify`]; a woken direction stops without
//! error. Byte counts survive early termination.

use std::io;
use std::net::SocketAddr;
use std::ops::Add;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::address::{
    put_socket_addr, read_addr_tail, to_family, Address, MAX_ADDR_LEN, UNSPECIFIED_V4,
    UNSPECIFIED_V6,
};
use crate::error::{invalid_data, io_error};
use crate::util::{RecvHalf, SendHalf, Split};

const BUF_SIZE: usize = 16 * 1024;

/// Scratch size for the UDP relay. Records whose address plus payload do not
/// fit are rejected.
pub const UDP_BUF_SIZE: usize = 16 * 1024;

/// Bytes read from the client (`up`) and written back to it (`down`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Traffic {
    pub up: u64,
    pub down: u64,
}

impl Add for Traffic {
    type Output = Traffic;

    fn add(self, rhs: Traffic) -> Traffic {
        Traffic {
            up: self.up + rhs.up,
            down: self.down + rhs.down,
        }
    }
}

type Finished = (u64, io::Result<()>);

async fn join_uplink(rx: oneshot::Receiver<Finished>) -> Finished {
    rx.await
        .unwrap_or_else(|_| (0, Err(io_error("relay task aborted"))))
}

async fn copy_counted<R, W>(r: &mut R, w: &mut W, n: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0; BUF_SIZE];
    loop {
        let len = r.read(&mut buf).await?;
        if len == 0 {
            return Ok(());
        }
        write_counted(w, &buf[..len], n).await?;
    }
}

/// Like `write_all` followed by `flush`, but `n` grows with every partial write.
async fn write_counted<W>(w: &mut W, mut data: &[u8], n: &mut u64) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    while !data.is_empty() {
        let written = w.write(data).await?;
        if written == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        *n += written as u64;
        data = &data[written..];
    }
    w.flush().await
}

/// Dials `target` and splices it with the client stream until both directions end.
///
/// A clean end of one direction half-closes the opposite write side so the
/// other direction can drain. An error in either direction tears down both.
pub async fn relay_tcp<R, W>(
    mut r: R,
    w: &mut W,
    target: SocketAddr,
) -> (Traffic, io::Result<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + ?Sized,
{
    let rc = match TcpStream::connect(target).await {
        Ok(rc) => rc,
        Err(e) => return (Traffic::default(), Err(e)),
    };
    let (mut rr, mut rw) = rc.into_split();

    let wake_uplink = Arc::new(Notify::new());
    let wake_downlink = Arc::new(Notify::new());
    let (tx, rx) = oneshot::channel();

    let (woken, wake) = (wake_uplink.clone(), wake_downlink.clone());
    tokio::spawn(async move {
        let mut nr = 0;
        let result = tokio::select! {
            r = copy_counted(&mut r, &mut rw, &mut nr) => r,
            _ = woken.notified() => Ok(()),
        };
        let result = match result {
            Ok(()) => {
                let _ = rw.shutdown().await;
                Ok(())
            }
            Err(e) => {
                wake.notify_one();
                Err(e)
            }
        };
        let _ = tx.send((nr, result));
    });

    let mut nw = 0;
    let result = tokio::select! {
        r = copy_counted(&mut rr, &mut *w, &mut nw) => r,
        _ = wake_downlink.notified() => Ok(()),
    };
    let result = match result {
        Ok(()) => {
            let _ = w.shutdown().await;
            Ok(())
        }
        Err(e) => {
            wake_uplink.notify_one();
            Err(e)
        }
    };

    let (nr, uplink) = join_uplink(rx).await;
    debug!(%target, up = nr, down = nw, "tcp relay finished");
    (Traffic { up: nr, down: nw }, result.and(uplink))
}

async fn bind_any() -> io::Result<UdpSocket> {
    match UdpSocket::bind(UNSPECIFIED_V6).await {
        Ok(socket) => Ok(socket),
        Err(_) => UdpSocket::bind(UNSPECIFIED_V4).await,
    }
}

async fn udp_uplink<R>(
    r: &mut R,
    socket: &mut SendHalf<UdpSocket>,
    nr: &mut u64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let local = socket.local_addr()?;
    let mut buf = vec![0; UDP_BUF_SIZE];
    let mut prev_wire = Vec::with_capacity(MAX_ADDR_LEN);
    let mut prev_target = None;

    loop {
        // a stream ending before the next record starts is a clean end
        if r.read(&mut buf[..1]).await? == 0 {
            return Ok(());
        }
        let len = read_addr_tail(&mut *r, &mut buf).await?;

        let target = match prev_target {
            Some(target) if prev_wire[..] == buf[..len] => target,
            _ => {
                let addr = Address::from_wire(&buf[..len])?;
                let target = to_family(addr.resolve().await?, &local);
                debug!(%addr, %target, "udp target");
                prev_wire.clear();
                prev_wire.extend_from_slice(&buf[..len]);
                prev_target = Some(target);
                target
            }
        };

        // Length(2) | CRLF(2); the CRLF is not checked.
        r.read_exact(&mut buf[len..len + 4]).await?;
        let size = u16::from_be_bytes([buf[len], buf[len + 1]]) as usize;
        *nr += (len + 4 + size) as u64;
        if len + size > buf.len() {
            return Err(invalid_data("udp payload too large"));
        }

        r.read_exact(&mut buf[len..len + size]).await?;
        socket.send_to(&buf[len..len + size], &target).await?;
        trace!(%target, size, "udp datagram sent");
    }
}

async fn udp_downlink<W>(
    socket: &mut RecvHalf<UdpSocket>,
    w: &mut W,
    idle: Duration,
    nw: &mut u64,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    // [address, ending at SPLIT][length(2)][CRLF][payload]
    const SPLIT: usize = MAX_ADDR_LEN;

    let mut buf = vec![0; UDP_BUF_SIZE];
    buf[SPLIT + 2..SPLIT + 4].copy_from_slice(b"\r\n");

    loop {
        let (n, from) = match timeout(idle, socket.recv_from(&mut buf[SPLIT + 4..])).await {
            Ok(r) => r?,
            Err(_) => {
                debug!(?idle, "udp relay idle");
                return Ok(());
            }
        };

        buf[SPLIT..SPLIT + 2].copy_from_slice(&(n as u16).to_be_bytes());
        let len = put_socket_addr(&mut buf[..SPLIT], from);

        write_counted(&mut *w, &buf[SPLIT - len..SPLIT + 4 + n], nw).await?;
        trace!(%from, size = n, "udp datagram received");
    }
}

/// Relays framed datagrams between the client stream and an ephemeral UDP socket.
///
/// Ends when the client stream ends, when no datagram arrives within `idle`,
/// or on the first error in either direction.
pub async fn relay_udp<R, W>(
    mut r: R,
    w: &mut W,
    idle: Duration,
) -> (Traffic, io::Result<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + ?Sized,
{
    let socket = match bind_any().await {
        Ok(socket) => socket,
        Err(e) => return (Traffic::default(), Err(e)),
    };
    let (mut recv, mut send) = socket.split();

    let wake_uplink = Arc::new(Notify::new());
    let wake_downlink = Arc::new(Notify::new());
    let (tx, rx) = oneshot::channel();

    let (woken, wake) = (wake_uplink.clone(), wake_downlink.clone());
    tokio::spawn(async move {
        let mut nr = 0;
        let result = tokio::select! {
            r = udp_uplink(&mut r, &mut send, &mut nr) => r,
            _ = woken.notified() => Ok(()),
        };
        wake.notify_one();
        let _ = tx.send((nr, result));
    });

    let mut nw = 0;
    let result = tokio::select! {
        r = udp_downlink(&mut recv, &mut *w, idle, &mut nw) => r,
        _ = wake_downlink.notified() => Ok(()),
    };
    wake_uplink.notify_one();

    let (nr, uplink) = join_uplink(rx).await;
    debug!(up = nr, down = nw, "udp relay finished");
    (Traffic { up: nr, down: nw }, result.and(uplink))
}
