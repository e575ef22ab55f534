use std::convert::TryFrom;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::debug;

use crate::address::{read_addr_buf, Address, MAX_ADDR_LEN};
use crate::error::{Error, Result};
use crate::relay::{relay_tcp, relay_udp, Traffic};
use crate::util::{sha224, ToHex};

/// Length of the hex credential that prefixes every connection.
pub const HEADER_LEN: usize = 56;

pub const CMD_CONNECT: u8 = 1;
pub const CMD_ASSOCIATE: u8 = 3;

pub const UDP_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Connect,
    Associate,
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(cmd: u8) -> Result<Self> {
        match cmd {
            CMD_CONNECT => Ok(Self::Connect),
            CMD_ASSOCIATE => Ok(Self::Associate),
            _ => Err(Error::Command(cmd)),
        }
    }
}

/// Lowercase hex SHA-224 of `password`.
pub fn gen_key(password: &str) -> String {
    sha224(password.as_bytes()).to_hex()
}

/// Serves one request read from `r`, with the credential prefix already consumed.
///
/// The returned traffic is reported whether or not the relay succeeded and
/// should be attributed to the authenticated credential.
pub async fn handle<R, W>(r: R, w: W) -> (Traffic, Result<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    handle_with_idle(r, w, UDP_IDLE_TIMEOUT).await
}

/// Like [`handle`], with a custom idle bound for UDP associations.
pub async fn handle_with_idle<R, W>(
    mut r: R,
    mut w: W,
    idle: Duration,
) -> (Traffic, Result<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1 + 2 + MAX_ADDR_LEN];

    if let Err(e) = r.read_exact(&mut buf[..1]).await {
        return (Traffic::default(), Err(Error::ReadCommand(e)));
    }

    let len = match read_addr_buf(&mut r, &mut buf[3..]).await {
        Ok(len) => len,
        Err(e) => return (Traffic::default(), Err(Error::ReadAddr(e))),
    };

    // 0x0d 0x0a, not checked
    if let Err(e) = r.read_exact(&mut buf[1..3]).await {
        return (Traffic::default(), Err(Error::ReadCrlf(e)));
    }

    let command = match Command::try_from(buf[0]) {
        Ok(command) => command,
        Err(e) => return (Traffic::default(), Err(e)),
    };

    match command {
        Command::Connect => {
            let target = match Address::from_wire(&buf[3..3 + len]) {
                Ok(addr) => addr,
                Err(e) => return (Traffic::default(), Err(Error::ResolveTcp(e))),
            };
            let resolved = match target.resolve().await {
                Ok(resolved) => resolved,
                Err(e) => return (Traffic::default(), Err(Error::ResolveTcp(e))),
            };
            debug!(%target, %resolved, "connect");

            let (traffic, result) = relay_tcp(r, &mut w, resolved).await;
            (traffic, result.map_err(Error::HandleTcp))
        }
        Command::Associate => {
            debug!("udp associate");
            let (traffic, result) = relay_udp(r, &mut w, idle).await;
            (traffic, result.map_err(Error::HandleUdp))
        }
    }
}
