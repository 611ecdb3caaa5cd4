//! Integration tests for logging configuration

use bridge_traits::time::LogLevel;
use core_runtime::logging::{parse_log_level, redact_url, LogFormat, LoggingConfig};

#[test]
fn test_logging_configuration() {
    // Only one global subscriber per process, so exercise the builder
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Debug)
        .with_spans(true);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Debug);
    assert!(config.enable_spans);
    assert!(config.logger_sink.is_none());
}

#[test]
fn test_signed_urls_are_redacted() {
    let url = "https://rr1.example.com/videoplayback?expire=1700000000&ip=10.0.0.1&sig=ABCD";
    let redacted = redact_url(url);

    assert_eq!(redacted, "https://rr1.example.com/videoplayback?[REDACTED]");
    assert!(!redacted.contains("10.0.0.1"));
    assert!(!redacted.contains("sig="));
}

#[test]
fn test_plain_urls_pass_through() {
    assert_eq!(
        redact_url("http://127.0.0.1:8080/media/1001.m4a"),
        "http://127.0.0.1:8080/media/1001.m4a"
    );
    assert_eq!(redact_url(""), "");
}

#[test]
fn test_format_and_level_from_env_strings() {
    assert_eq!(" compact ".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert_eq!(parse_log_level("TRACE").unwrap(), LogLevel::Trace);
    assert_eq!(parse_log_level("error").unwrap(), LogLevel::Error);
    assert!(parse_log_level("").is_err());
}

#[test]
fn test_filter_configuration() {
    let config = LoggingConfig::default().with_filter("core_playback=debug,sqlx=info");

    assert_eq!(
        config.filter,
        Some("core_playback=debug,sqlx=info".to_string())
    );
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
