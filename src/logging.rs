//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Console output always goes to stderr; stdout is reserved for generated
//! configuration, automation results and reports. When `debug_log` is set
//! an additional JSON layer appends to that file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Holds the non-blocking writer guard for file logging.
///
/// The [`WorkerGuard`] must be kept alive for the duration of the process.
/// Dropping it flushes pending log entries and closes the file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Default filter directive: `debug` with `--verbose`, else `info`.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Initialise console logging on stderr. `RUST_LOG` takes precedence over
/// `verbose`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_cli(verbose: bool) -> anyhow::Result<()> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// Initialise console logging plus a JSON layer appending to `debug_log`.
///
/// Returns a [`LoggingGuard`] that must be kept alive for log flushing.
///
/// # Errors
///
/// Returns an error if the directory of `debug_log` cannot be created or a
/// global subscriber is already installed.
pub fn init_with_debug_log(verbose: bool, debug_log: &Path) -> anyhow::Result<LoggingGuard> {
    let dir = match debug_log.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| anyhow::anyhow!("failed to create log directory {}: {e}", dir.display()))?;
    let file_name = debug_log
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("invalid debug log path {}", debug_log.display()))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}
