//! Logger setup for the CLI.
//!
//! Library code logs per-request events under three targets
//! ([`LOG_TARGET_ATTEMPT`], [`LOG_TARGET_REDIRECT`], [`LOG_TARGET_CACHE`]), so
//! `RUST_LOG=request_util::cache=debug` narrows output to cache decisions. The
//! plain format shows those events by their short name.

use std::io::Write;

use colored::*;
use log::{Level, LevelFilter};
use serde_json::json;

use crate::config::{LogFormat, LOG_TARGET_ATTEMPT, LOG_TARGET_CACHE, LOG_TARGET_REDIRECT};
use crate::error_handling::InitializationError;

/// Dependencies whose logs are only interesting when something goes wrong.
const QUIET_CRATES: &[(&str, LevelFilter)] = &[
    ("reqwest", LevelFilter::Info),
    ("hyper", LevelFilter::Warn),
    ("hyper_util", LevelFilter::Warn),
    ("h2", LevelFilter::Warn),
    ("rustls", LevelFilter::Warn),
    ("native_tls", LevelFilter::Warn),
];

/// Short event name for a per-request target, `None` for anything else.
fn event_name(target: &str) -> Option<&'static str> {
    match target {
        LOG_TARGET_ATTEMPT => Some("attempt"),
        LOG_TARGET_REDIRECT => Some("redirect"),
        LOG_TARGET_CACHE => Some("cache"),
        _ => None,
    }
}

fn json_line(ts: i64, level: Level, target: &str, msg: &str) -> String {
    let mut line = json!({
        "ts": ts,
        "level": level.as_str(),
        "target": target,
        "msg": msg,
    });
    if let Some(event) = event_name(target) {
        line["event"] = json!(event);
    }
    line.to_string()
}

fn colored_level(level: Level) -> ColoredString {
    let name = format!("{:<5}", level.as_str());
    match level {
        Level::Error => name.red(),
        Level::Warn => name.yellow(),
        Level::Info => name.green(),
        Level::Debug => name.blue(),
        Level::Trace => name.purple(),
    }
}

/// Installs the process logger.
///
/// `RUST_LOG` directives are read first; `level` then replaces the default
/// level, while module directives such as `request_util::redirect=trace`
/// still apply.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` when a logger is already set.
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    for (module, quiet) in QUIET_CRATES {
        builder.filter_module(module, (*quiet).min(level));
    }

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                let line = json_line(
                    chrono::Utc::now().timestamp_millis(),
                    record.level(),
                    record.target(),
                    &record.args().to_string(),
                );
                writeln!(buf, "{line}")
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                let source = match event_name(record.target()) {
                    Some(event) => event.bold(),
                    None => record.target().cyan(),
                };
                writeln!(
                    buf,
                    "{} {} {} {}",
                    chrono::Local::now().format("%H:%M:%S%.3f").to_string().dimmed(),
                    colored_level(record.level()),
                    source,
                    record.args()
                )
            });
        }
    }

    builder.try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_event_names_cover_request_targets() {
        assert_eq!(event_name(LOG_TARGET_ATTEMPT), Some("attempt"));
        assert_eq!(event_name(LOG_TARGET_REDIRECT), Some("redirect"));
        assert_eq!(event_name(LOG_TARGET_CACHE), Some("cache"));
        assert_eq!(event_name("request_util::fetch"), None);
        assert_eq!(event_name("reqwest::connect"), None);
    }

    #[test]
    fn test_json_line_tags_request_events() {
        let line: Value =
            serde_json::from_str(&json_line(42, Level::Warn, LOG_TARGET_CACHE, "write \"failed\""))
                .unwrap();
        assert_eq!(line["ts"], 42);
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["event"], "cache");
        assert_eq!(line["msg"], "write \"failed\"");

        let line: Value = serde_json::from_str(&json_line(1, Level::Info, "hyper", "x")).unwrap();
        assert!(line.get("event").is_none());
    }

    #[test]
    fn test_quiet_crates_are_distinct_from_own_targets() {
        assert!(QUIET_CRATES
            .iter()
            .all(|(module, _)| !module.starts_with("request_util")));
    }

    #[test]
    fn test_second_init_is_a_logger_error() {
        let _ = env_logger::builder().is_test(true).try_init();
        let err = init_logger_with(LevelFilter::Debug, LogFormat::Json).unwrap_err();
        assert!(matches!(err, InitializationError::LoggerError(_)));
    }
}
