//! Tracing integration for structured logging
//!
//! Reusable subscriber setup for binaries and tests embedding the agent.

use std::io;
use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// Structured JSON output
    Json,
}

/// Initialize the logging system.
///
/// `verbosity` maps 0..=4 to error..trace; `RUST_LOG` overrides it.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> io::Result<()> {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("revtun_core={level},revtun_agent={level}"))
    });

    match (log_file, format) {
        (None, LogFormat::Text) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .try_init()
                .map_err(io::Error::other)?;
        }
        (None, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .try_init()
                .map_err(io::Error::other)?;
        }
        (Some(path), LogFormat::Text) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(file).with_ansi(false))
                .try_init()
                .map_err(io::Error::other)?;
        }
        (Some(path), LogFormat::Json) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(file))
                .try_init()
                .map_err(io::Error::other)?;
        }
    }

    Ok(())
}

fn open_log_file(path: &Path) -> io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize logging with defaults for tests.
///
/// Silently ignores errors: the subscriber may already be installed.
pub fn init_test_logging() {
    let _ = init_logging(2, None, LogFormat::Text);
}
