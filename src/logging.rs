//! Log setup for hosts that do not install their own `tracing` subscriber.
//!
//! `BREEZ_SDK_LOG` filters SDK output and wins over `RUST_LOG`. Without either,
//! the SDK and CLI log at `info`, dependencies at `warn`. `BREEZ_SDK_LOG_JSON=1`
//! switches to JSON lines.

use tracing_subscriber::{fmt, EnvFilter};

const FILTER_ENV: &str = "BREEZ_SDK_LOG";
const JSON_ENV: &str = "BREEZ_SDK_LOG_JSON";
const DEFAULT_DIRECTIVES: &str = "warn,breez_sdk_core=info,breez_cli=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("1") | Some("true") | Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// First non-empty filter: `BREEZ_SDK_LOG`, then `RUST_LOG`, then `fallback`.
fn filter_directives(sdk: Option<&str>, rust_log: Option<&str>, fallback: &str) -> String {
    [sdk, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Install the global subscriber with the SDK defaults. Later calls are no-ops.
pub fn init_logging() {
    init_logging_with(DEFAULT_DIRECTIVES);
}

/// Like [`init_logging`], with `default_directives` used when neither env
/// variable is set. Returns `false` if a subscriber was already installed.
pub fn init_logging_with(default_directives: &str) -> bool {
    let directives = filter_directives(
        std::env::var(FILTER_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
        default_directives,
    );
    let env_filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("invalid log filter {directives:?} ({e}), using defaults");
        EnvFilter::new(DEFAULT_DIRECTIVES)
    });

    let builder = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr);
    let installed = match LogFormat::from_env_value(std::env::var(JSON_ENV).ok().as_deref()) {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Compact => builder.with_target(false).compact().try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_filter_wins_over_rust_log() {
        assert_eq!(filter_directives(Some("debug"), Some("trace"), "info"), "debug");
        assert_eq!(filter_directives(Some("  "), Some("trace"), "info"), "trace");
        assert_eq!(filter_directives(None, None, DEFAULT_DIRECTIVES), DEFAULT_DIRECTIVES);
    }

    #[test]
    fn test_json_format_switch() {
        assert_eq!(LogFormat::from_env_value(Some("1")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("0")), LogFormat::Compact);
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Compact);
    }

    #[test]
    fn test_default_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_second_init_is_no_op() {
        init_logging();
        assert!(!init_logging_with("debug"));
        tracing::info!("logging initialised");
    }
}
