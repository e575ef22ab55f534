use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maps the trojan `log_level` number onto a filter directive.
pub fn level_directive(log_level: u8) -> &'static str {
    match log_level {
        0 => "trace",
        1 => "info",
        2 => "warn",
        3 | 4 => "error",
        _ => "off",
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `log_level`.
pub fn init(log_level: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level_directive(log_level);
        EnvFilter::new(format!("trojan={},trojan_server={}", level, level))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .init();
}
