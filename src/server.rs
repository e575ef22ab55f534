//! Plain TCP front end: checks the credential prefix, then hands the stream
//! to [`handle_with_idle`]. TLS is expected to be terminated before this
//! listener.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::registry::Registry;
use crate::trojan::{handle_with_idle, HEADER_LEN};
use crate::util::set_tcp_keepalive;

pub struct Server {
    config: Config,
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(config: Config, registry: Arc<Registry>) -> Self {
        Self { config, registry }
    }

    pub async fn run(self) -> Result<()> {
        let addr = (self.config.local_addr.as_str(), self.config.local_port);
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let server = Arc::new(self);
        let mut incoming = TcpListenerStream::new(listener);

        while let Some(stream) = incoming.next().await {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };

            let server = server.clone();
            tokio::spawn(async move { server.accept(stream).await });
        }

        Ok(())
    }

    async fn accept(&self, stream: TcpStream) {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(_) => return,
        };
        if let Err(e) = stream.set_nodelay(self.config.tcp.no_delay) {
            debug!(%peer, error = %e, "set_nodelay failed");
        }
        if let Err(e) = set_tcp_keepalive(&stream, self.config.tcp.keep_alive) {
            debug!(%peer, error = %e, "set keepalive failed");
        }

        let (mut r, w) = stream.into_split();
        let mut header = [0u8; HEADER_LEN + 2];
        if let Err(e) = r.read_exact(&mut header).await {
            debug!(%peer, error = %e, "read credential failed");
            return;
        }

        let key = match std::str::from_utf8(&header[..HEADER_LEN]) {
            Ok(key) if &header[HEADER_LEN..] == b"\r\n" && self.registry.validate(key) => {
                key.to_owned()
            }
            _ => {
                warn!(%peer, "authentication failed");
                return;
            }
        };
        info!(%peer, "accepted");

        let (traffic, result) = handle_with_idle(r, w, self.config.udp_timeout()).await;
        self.registry.consume(&key, traffic);

        match result {
            Ok(()) => debug!(%peer, up = traffic.up, down = traffic.down, "closed"),
            Err(e) => info!(%peer, up = traffic.up, down = traffic.down, error = %e, "closed"),
        }
    }
}
