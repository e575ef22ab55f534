use std::io::{self, ErrorKind};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("read command error: {0}")]
    ReadCommand(#[source] io::Error),
    #[error("read addr error: {0}")]
    ReadAddr(#[source] io::Error),
    #[error("read 0x0d 0x0a error: {0}")]
    ReadCrlf(#[source] io::Error),
    #[error("resolve tcp addr error: {0}")]
    ResolveTcp(#[source] io::Error),
    #[error("handle tcp error: {0}")]
    HandleTcp(#[source] io::Error),
    #[error("handle udp error: {0}")]
    HandleUdp(#[source] io::Error),
    #[error("command error")]
    Command(u8),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<&str> for Error {
    fn from(desc: &str) -> Self {
        Error::Config(desc.to_owned())
    }
}

pub fn io_error(desc: &str) -> io::Error {
    io::Error::new(ErrorKind::Other, desc)
}

pub fn invalid_data(desc: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, desc)
}
