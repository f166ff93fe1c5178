//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
/// Files ending in `.json` are read as JSON instead.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config = if is_json {
        parse_json(&content)?
    } else {
        parse_toml(&content)?
    };

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

pub fn parse_toml(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

pub fn parse_json(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(serde_json::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_sections() {
        let config = parse_toml(
            r#"
            backends = ["http://127.0.0.1:9001", "http://127.0.0.1:9002"]

            [listener]
            bind_address = "127.0.0.1:8000"

            [health_check]
            interval_secs = 3
            path = "/status"

            [rate_limit]
            enabled = true
            capacity = 20
            refill_per_sec = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
        assert_eq!(config.health_check.interval_secs, 3);
        assert_eq!(config.health_check.path, "/status");
        // untouched fields keep their defaults
        assert_eq!(config.health_check.timeout_ms, 5_000);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.capacity, 20);
        assert_eq!(config.rate_limit.refill_per_sec, 5);
    }

    #[test]
    fn test_parse_legacy_json() {
        let config = parse_json(
            r#"{"port": "8080", "backends": ["http://localhost:8081", "http://localhost:8082"]}"#,
        )
        .unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.backends[1], "http://localhost:8082");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = std::env::temp_dir().join(format!("distributor-cfg-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.toml");
        fs::write(&path, "[health_check]\npath = \"/health\"\n").unwrap();

        match load_config(&path) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![ValidationError::NoBackends]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
