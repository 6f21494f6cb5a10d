use anyhow::Result;
use std::fs::{self, File};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install a global `tracing` subscriber described by `config`.
///
/// The runtime only emits events; nothing changes if this is never called.
/// Calling it twice returns an error rather than replacing the first subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    // Format: info,troupe=debug
    let filter = format!("info,troupe={}", config.level);
    EnvFilter::builder().parse(&filter)?;

    let stdout_layer = config.stdout.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_thread_ids(true)
            .with_target(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(&filter))
    });

    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            let file_writer = std::sync::Mutex::new(file);
            Some(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(EnvFilter::new(&filter)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
