pub mod address;
pub mod config;
pub mod error;
pub mod logger;
pub mod registry;
pub mod relay;
pub mod server;
pub mod trojan;
pub mod util;
