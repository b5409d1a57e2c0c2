//! Tracing subscriber setup
//!
//! Libraries only emit events; the host application decides where they go.
//! [`init`] is a convenience for binaries and tests that want the default
//! `fmt` output.

use taskdesk_domain::{LoggingSettings, Result, TaskdeskError};
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured log filter
pub const LOG_ENV_VAR: &str = "TASKDESK_LOG";

/// Install a global `fmt` subscriber.
///
/// The filter comes from `TASKDESK_LOG` when set, otherwise from
/// `settings.level`. Uses `try_init` so it's safe to call multiple times
/// (e.g. from tests); only the first call installs a subscriber.
///
/// # Errors
/// Returns `TaskdeskError::Config` if the filter directive cannot be parsed.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let filter = build_filter(settings)?;

    let result = if settings.json {
        fmt::fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt::fmt().with_env_filter(filter).try_init()
    };
    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
    Ok(())
}

fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter> {
    let directive = std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| settings.level.clone());
    EnvFilter::try_new(&directive)
        .map_err(|e| TaskdeskError::Config(format!("Invalid log filter '{directive}': {e}")))
}
