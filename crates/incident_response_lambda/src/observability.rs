//! Logging setup for the incident-response runtime.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

pub const COMPONENT: &str = "incident_dispatcher";

/// Set by the Lambda runtime for every deployed function.
pub const LAMBDA_FUNCTION_NAME_ENV: &str = "AWS_LAMBDA_FUNCTION_NAME";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for CloudWatch.
    #[default]
    Json,
    /// Human-readable output for local runs.
    Pretty,
}

impl LogFormat {
    /// JSON inside a deployed function, pretty output anywhere else.
    pub fn for_function_name(function_name: Option<&str>) -> Self {
        match function_name {
            Some(name) if !name.trim().is_empty() => Self::Json,
            _ => Self::Pretty,
        }
    }

    pub fn from_env() -> Self {
        Self::for_function_name(std::env::var(LAMBDA_FUNCTION_NAME_ENV).ok().as_deref())
    }
}

/// Installs the global subscriber. Later calls are no-ops.
///
/// The level filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        fmt::layer()
                            .json()
                            .with_ansi(false)
                            .with_current_span(true)
                            .with_target(false),
                    )
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployed_function_logs_json() {
        assert_eq!(
            LogFormat::for_function_name(Some("incident-response")),
            LogFormat::Json
        );
    }

    #[test]
    fn local_runs_log_pretty() {
        assert_eq!(LogFormat::for_function_name(None), LogFormat::Pretty);
        assert_eq!(LogFormat::for_function_name(Some("")), LogFormat::Pretty);
        assert_eq!(LogFormat::for_function_name(Some("  ")), LogFormat::Pretty);
    }

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Json);
        init_logging(LogFormat::Pretty);
        tracing::info!(component = COMPONENT, "logging initialized");
    }
}
