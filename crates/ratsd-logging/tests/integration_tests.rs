//! Integration tests for ratsd logging setup

use ratsd_logging::{init_console_logging, init_logging, LogFormat, LoggingConfig};
use tracing::{info, warn};

#[test]
fn console_logging_initialization() {
    assert!(init_console_logging("debug").is_ok());

    info!("test info message");
    warn!(attester = "tsm-report", "test warning with a field");
}

#[test]
fn repeated_initialization_is_harmless() {
    let config = LoggingConfig {
        level: "ratsd=debug,info".to_string(),
        format: LogFormat::Json,
    };

    assert!(init_logging(&config, "ratsd").is_ok());
    assert!(init_logging(&config, "ratsd").is_ok());
    assert!(init_console_logging("info").is_ok());
}

#[test]
fn invalid_level_is_reported_before_install() {
    let config = LoggingConfig {
        level: "ratsd=notalevel".to_string(),
        format: LogFormat::Text,
    };
    assert!(init_logging(&config, "ratsd").is_err());
}

#[test]
fn config_deserializes_from_lowercase_names() {
    let config: LoggingConfig =
        serde_json::from_str(r#"{"level": "warn", "format": "json"}"#).unwrap();
    assert_eq!(config.level, "warn");
    assert_eq!(config.format, LogFormat::Json);

    let partial: LoggingConfig = serde_json::from_str(r#"{"format": "text"}"#).unwrap();
    assert_eq!(partial.level, "info");
}
