use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::trojan::UDP_IDLE_TIMEOUT;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub run_type: String,
    pub local_addr: String,
    pub local_port: u16,
    pub password: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp_timeout: Option<u64>,
    pub log_level: u8,
    pub tcp: TcpConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TcpConfig {
    pub no_delay: bool,
    pub keep_alive: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Config = serde_json::from_str(&fs::read_to_string(path)?)?;
        if config.run_type != "server" {
            return Err("run_type must be \"server\"".into());
        }
        Ok(config)
    }

    pub fn udp_timeout(&self) -> Duration {
        self.udp_timeout
            .map(Duration::from_secs)
            .unwrap_or(UDP_IDLE_TIMEOUT)
    }
}
