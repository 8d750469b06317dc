/// Tracing setup for the binary: stderr plus an optional daily-rolling file.
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// file writer on drop, so the caller keeps it alive until exit.
use crate::config::LogConfig;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "analyzer.log";

fn filter(config: &LogConfig) -> Result<EnvFilter> {
    let directive = format!("combat_ledger_analyzer={}", config.level)
        .parse::<Directive>()
        .with_context(|| format!("Invalid log level '{}'", config.level))?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}

pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = filter(config)?;

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // log files should not contain ANSI colour codes
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    install_panic_hook();

    match &config.directory {
        Some(dir) => tracing::info!("Logging to stderr and {}", dir.display()),
        None => tracing::debug!("Logging to stderr"),
    }
    Ok(guard)
}

/// Route panic messages through tracing so they reach the log file too.
/// Handler panics are caught by the dispatcher but still pass through here.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_filter_for_configured_level() {
        let config = LogConfig { directory: None, level: "debug".into() };
        assert!(filter(&config).is_ok());
    }
}
