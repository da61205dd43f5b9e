//! Structured logging for ratsd
//!
//! Both the daemon and its plugins log through `tracing`. Output always goes
//! to stderr: a plugin's stdout carries its RPC channel, and the daemon
//! follows the same convention so logs from both land in one stream.
//!
//! ```rust,no_run
//! use ratsd_logging::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default(), "ratsd")?;
//! tracing::info!(listen_addr = "localhost:8895", "ratsd starting");
//! # Ok::<(), ratsd_logging::LoggingError>(())
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

pub mod error;

pub use error::{LoggingError, LoggingResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `ratsd=debug,ratsd_plugin=trace`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

fn parse_filter(level: &str) -> LoggingResult<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel {
        level: level.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. Calling this when a subscriber
/// is already installed logs a warning and keeps the existing one.
pub fn init_logging(config: &LoggingConfig, service_name: &str) -> LoggingResult<()> {
    let configured = parse_filter(&config.level)?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(configured);

    let fmt_layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_level(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(false)
            .boxed(),
    };

    match Registry::default().with(fmt_layer).with(env_filter).try_init() {
        Ok(()) => {
            tracing::debug!(service = service_name, format = ?config.format, "logging initialized")
        }
        Err(err) => {
            tracing::warn!("logging already initialized, skipping duplicate subscriber: {err}")
        }
    }

    Ok(())
}

/// Simplified initialization for tests and small binaries
pub fn init_console_logging(level: &str) -> LoggingResult<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(parse_filter(level)?)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_level(true);

    // A subscriber may already be set, e.g. by another test.
    let _ = builder.try_init();

    Ok(())
}
