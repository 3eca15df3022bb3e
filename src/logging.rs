//! Logging configuration for `desksync`

use std::path::Path;

use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::Result;

/// Initialize logging with the default (info) level
pub fn init_logging() -> Result<()> {
    init_logging_with_level("info")
}

/// Initialize logging with a custom log level
///
/// Console output goes to stdout (info and above) with errors duplicated to
/// stderr; the full detail stream is appended to `logs/desksync.log.YYYY-MM-DD`.
/// Third-party library noise is kept at warn, sqlx query logging is disabled.
pub fn init_logging_with_level(level: &str) -> Result<()> {
    let logs_dir = Path::new("logs");
    if !logs_dir.exists() {
        std::fs::create_dir_all(logs_dir)?;
    }

    let env_filter = EnvFilter::new(format!(
        "warn,desksync={level},sqlx=error,hyper=warn,reqwest=warn"
    ));

    let file_appender = tracing_appender::rolling::daily("logs", "desksync.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stdout)
        .with_filter(tracing_subscriber::filter::LevelFilter::INFO);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_ansi(false);

    Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::debug!("Logging initialized with level: {}", level);

    // Keep the appender guard alive for the process lifetime
    std::mem::forget(guard);

    Ok(())
}

/// Initialize simple logging for testing
pub fn init_simple_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(tracing::Level::INFO)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_initialization() {
        // Only checks that initialization doesn't panic; a second init in the
        // same process returns an error and is ignored.
        let _ = init_simple_logging();
    }
}
