//! Tracing subscriber setup for `sltool`.
//!
//! Logs go to stderr so stdout carries nothing but the JSON output.

use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogConfig, LogFormat};
use crate::{Error, Result};

/// Install the global subscriber. Fails if one is already installed.
///
/// An unparsable filter falls back to `warn` instead of failing.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
    };
    installed.map_err(|e| Error::Logging(e.to_string()))
}

/// Validation hook that forwards blob and serializer findings to the log.
pub fn log_validation_error(message: &str) {
    warn!(target: "sl_core::validation", "{message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_fails() {
        let config = LogConfig {
            format: LogFormat::Compact,
            filter: "not a [valid filter".to_string(),
        };
        // the first call may race other tests for the global slot
        let _ = init_logging(&config);
        assert!(matches!(init_logging(&config), Err(Error::Logging(_))));
    }

    #[test]
    fn hook_is_callable_without_a_subscriber() {
        log_validation_error("blob is too short");
    }
}
