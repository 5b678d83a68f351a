use std::sync::OnceLock;

use planner_core::config::{LogFormat, LoggingConfig};
use tracing::Level;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Installs the global fmt subscriber. Safe to call more than once; returns
/// whether a subscriber from this crate is active.
pub fn init(config: &LoggingConfig) -> bool {
    *INSTALLED.get_or_init(|| {
        let installed = install(config);
        if installed {
            tracing::info!(
                event_name = "planner.startup",
                version = env!("CARGO_PKG_VERSION"),
                level = %config.level,
                format = ?config.format,
                "project planner logging initialized"
            );
        }
        installed
    })
}

fn install(config: &LoggingConfig) -> bool {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(level);

    // `try_init` fails when the host application already set a subscriber.
    match config.format {
        LogFormat::Compact => builder.compact().try_init().is_ok(),
        LogFormat::Pretty => builder.pretty().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
