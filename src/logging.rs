//! Logging setup for the `harvest` binary.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Parse a configured level name, defaulting to `info`.
fn parse_log_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "off" | "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level; `verbose` forces `debug`.
/// With `logging.file` set, logs go to that file only (no ANSI). Otherwise
/// they go to stderr, colored when stderr is a terminal.
///
/// Returns the guard that must be kept alive until exit when logging to a
/// file.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        parse_log_level(&config.level)
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if let Some(file) = &config.file {
        if let Some((dir, name)) = split_log_path(file) {
            if std::fs::create_dir_all(dir).is_ok() {
                let appender = tracing_appender::rolling::never(dir, name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .try_init();
                return Some(guard);
            }
        }
        eprintln!("Warning: cannot open log file {}, logging to stderr", file.display());
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_writer(std::io::stderr)
        .try_init();
    None
}

fn split_log_path(file: &Path) -> Option<(&Path, &std::ffi::OsStr)> {
    let name = file.file_name()?;
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Some((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_log_level("WARN"), tracing::Level::WARN);
        assert_eq!(parse_log_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_log_level("nonsense"), tracing::Level::INFO);
    }

    #[test]
    fn log_path_split() {
        let (dir, name) = split_log_path(Path::new("logs/harvest.log")).unwrap();
        assert_eq!(dir, Path::new("logs"));
        assert_eq!(name, "harvest.log");

        let (dir, _) = split_log_path(Path::new("harvest.log")).unwrap();
        assert_eq!(dir, Path::new("."));
    }
}
