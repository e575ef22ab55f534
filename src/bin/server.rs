use std::sync::Arc;

use clap::{App, Arg};
use tracing::info;

use trojan::config::Config;
use trojan::error::Result;
use trojan::logger;
use trojan::registry::Registry;
use trojan::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = App::new("trojan-server")
        .version(env!("CARGO_PKG_VERSION"))
        .author("南浦月 <nanpuyue@gmail.com>")
        .about("Rust implementation of the trojan protocol")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG")
                .help("Specify the config file")
                .takes_value(true)
                .required(true),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap_or("config.json");
    let config = Config::load(config_path)?;
    logger::init(config.log_level);

    #[cfg(target_family = "unix")]
    trojan::util::set_rlimit_nofile(65535)?;

    let registry = Arc::new(Registry::new());
    for password in &config.password {
        registry.add(password);
    }
    info!(users = registry.len(), "loaded {}", config_path);

    Server::new(config, registry).run().await
}
