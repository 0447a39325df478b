//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_config_error_display() {
        let io_err = ConfigError::Io(
            PathBuf::from("site.yml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("IO error"));
        assert!(display.contains("site.yml"));

        let validation_err = ConfigError::Validation("`url` must not end with '/'".to_string());
        assert!(format!("{validation_err}").contains("must not end"));
    }

    #[test]
    fn test_yaml_error_converts() {
        let err = serde_yaml::from_str::<serde_yaml::Mapping>("[1, 2").unwrap_err();
        let err: ConfigError = err.into();
        assert_eq!(format!("{err}"), "Config file parsing error");
    }
}
