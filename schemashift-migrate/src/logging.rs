//! Logging setup for schemashift.
//!
//! The crates log through `tracing`. A subscriber is only installed by
//! [`init`] when the `tracing-subscriber` feature is enabled; otherwise the
//! embedding application owns the subscriber.
//!
//! # Environment Variables
//!
//! - `SCHEMASHIFT_DEBUG=true|1|yes` - enable debug logging
//! - `SCHEMASHIFT_LOG_LEVEL=trace|debug|info|warn|error` - set the level explicitly
//! - `SCHEMASHIFT_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! use schemashift_migrate::logging;
//!
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "SCHEMASHIFT_DEBUG";
const LEVEL_VAR: &str = "SCHEMASHIFT_LOG_LEVEL";
const FORMAT_VAR: &str = "SCHEMASHIFT_LOG_FORMAT";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line, human oriented.
    Pretty,
    /// Single line per event.
    Compact,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("pretty") => Self::Pretty,
            Some("compact") => Self::Compact,
            _ => Self::Json,
        }
    }
}

/// Whether `SCHEMASHIFT_DEBUG` is set to a truthy value.
#[inline]
pub fn is_debug_enabled() -> bool {
    parse_debug(env::var(DEBUG_VAR).ok().as_deref())
}

/// Configured log level. Defaults to `debug` in debug mode, else `warn`.
pub fn log_level() -> &'static str {
    parse_level(env::var(LEVEL_VAR).ok().as_deref(), is_debug_enabled())
}

/// Configured output format.
pub fn log_format() -> LogFormat {
    LogFormat::parse(env::var(FORMAT_VAR).ok().as_deref())
}

/// Install the subscriber configured by the environment.
///
/// Does nothing unless debug mode or a level is set. Only the first call has
/// an effect.
pub fn init() {
    let requested = is_debug_enabled() || env::var(LEVEL_VAR).is_ok();
    if requested {
        install(log_level());
    }
}

/// Install the subscriber at `level`, ignoring `SCHEMASHIFT_LOG_LEVEL`.
pub fn init_with_level(level: &str) {
    install(parse_level(Some(level), false));
}

/// Install the subscriber at debug level.
pub fn init_debug() {
    install("debug");
}

fn install(level: &'static str) {
    INIT.call_once(|| {
        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(format!(
                "schemashift={level},schemashift_schema={level},schemashift_migrate={level},schemashift_postgres={level}"
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let format = log_format();
            let registry = tracing_subscriber::registry().with(filter);
            match format {
                LogFormat::Json => registry.with(fmt::layer().json()).init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
            }

            tracing::info!(level, format = ?format, "schemashift logging initialized");
        }

        #[cfg(not(feature = "tracing-subscriber"))]
        {
            let _ = level;
        }
    });
}

fn parse_debug(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}

fn parse_level(value: Option<&str>, debug: bool) -> &'static str {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ if debug => "debug",
        _ => "warn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debug() {
        assert!(parse_debug(Some("TRUE")));
        assert!(parse_debug(Some("1")));
        assert!(!parse_debug(Some("no")));
        assert!(!parse_debug(None));
    }

    #[test]
    fn test_parse_level_defaults() {
        assert_eq!(parse_level(None, false), "warn");
        assert_eq!(parse_level(None, true), "debug");
        assert_eq!(parse_level(Some("Info"), true), "info");
        assert_eq!(parse_level(Some("loud"), false), "warn");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(Some("COMPACT")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(None), LogFormat::Json);
    }
}
