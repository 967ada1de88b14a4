//! Subscriber setup for the harness binary.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use crate::error::{HarnessError, Result};

pub const ENV_LOG: &str = "WBIND_LOG";
const DEFAULT_FILTER: &str = "warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Build the filter from an explicit directive, falling back to `warn`.
pub fn filter(level: Option<&str>) -> Result<EnvFilter> {
    let directive = level.unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directive)
        .map_err(|err| HarnessError::invalid(format!("log filter `{directive}`: {err}")))
}

/// Install the global subscriber, writing to stderr. A subscriber that is
/// already installed is left in place.
pub fn init(format: LogFormat, level: Option<&str>) -> Result<()> {
    let filter = filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_and_explicit_filters_parse() {
        assert!(filter(None).is_ok());
        assert!(filter(Some("wbind_core=trace,info")).is_ok());
    }

    #[test]
    fn bad_filter_is_invalid_argument() {
        let err = filter(Some("wbind_core=loud")).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidArgument { .. }));
    }
}
