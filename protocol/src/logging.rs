//! # Structured Logging
//!
//! Initializes the `tracing` subscriber with configurable format (JSON or
//! pretty-printed) and environment-based filtering via `RUST_LOG`.
//!
//! All log output is written to stderr. Secret scalars never reach a log
//! line; commitments, order hashes and error codes do.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ServiceConfig;

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "umbra_protocol=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for local development.
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive). Anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed (for example by
/// a test harness); the existing one is left in place.
pub fn init_logging(default_filter: &str, format: LogFormat) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!("logging initialized (format={:?})", format);
    }
    installed
}

/// Honour `enableLogging` from the service config. The format comes from
/// `UMBRA_LOG_FORMAT` and defaults to pretty output.
pub fn init_from_config(config: &ServiceConfig) -> bool {
    if !config.enable_logging {
        return false;
    }
    let format = std::env::var("UMBRA_LOG_FORMAT")
        .map(|v| LogFormat::from_str_lossy(&v))
        .unwrap_or(LogFormat::Pretty);
    init_logging(DEFAULT_FILTER, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lossy() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("xml"), LogFormat::Pretty);
    }

    #[test]
    fn disabled_config_installs_nothing() {
        let cfg = ServiceConfig {
            enable_logging: false,
            ..ServiceConfig::default()
        };
        assert!(!init_from_config(&cfg));
    }

    #[test]
    fn second_init_is_a_noop() {
        init_logging(DEFAULT_FILTER, LogFormat::Pretty);
        assert!(!init_logging(DEFAULT_FILTER, LogFormat::Json));
    }
}
