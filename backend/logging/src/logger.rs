//! Structured Logger
//!
//! Wraps `tracing` to provide a console layer, an optional daily-rolling
//! NDJSON file layer, and `RUST_LOG`-based level control.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Where console output goes. The MCP server owns stdout for JSON-RPC, so it
/// logs to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleTarget {
    #[default]
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct LoggerOptions {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    pub console: ConsoleTarget,
    /// Directory for `conductor.log.YYYY-MM-DD`; `None` disables the file layer.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleTarget::Stdout,
            log_dir: None,
        }
    }
}

/// Initialize the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logger(options: &LoggerOptions) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.level));

    let file_layer = options.log_dir.as_ref().map(|dir| {
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, "conductor.log");
        fmt::layer().json().with_writer(appender).with_ansi(false)
    });

    let (stdout_layer, stderr_layer) = match options.console {
        ConsoleTarget::Stdout => (
            Some(fmt::layer().with_writer(std::io::stdout).with_target(false)),
            None,
        ),
        ConsoleTarget::Stderr => (
            None,
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(false),
            ),
        ),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}
