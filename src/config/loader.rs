//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ManagerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `haproxy.config_path`.
pub const HAPROXY_CONFIG_PATH_ENV: &str = "HAPROXY_CONFIG_PATH";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "IO error reading {}: {}", path.display(), e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ManagerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    parse_config(&content)
}

/// Parse and validate configuration text, applying environment overrides.
pub fn parse_config(content: &str) -> Result<ManagerConfig, ConfigError> {
    let mut config: ManagerConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment overrides on top of file or default settings.
pub fn apply_env_overrides(config: &mut ManagerConfig) {
    if let Ok(path) = std::env::var(HAPROXY_CONFIG_PATH_ENV) {
        if !path.is_empty() {
            config.haproxy.config_path = PathBuf::from(path);
        }
    }
}

/// Read the `global`/`defaults` preamble, if one is configured.
pub fn load_preamble(path: Option<&Path>) -> Result<Option<String>, ConfigError> {
    match path {
        Some(path) => fs::read_to_string(path)
            .map(Some)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [listener]
            bind_address = "127.0.0.1:34015"

            [haproxy]
            reload_command = ["systemctl", "reload", "haproxy"]
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:34015");
        assert_eq!(config.haproxy.reload_command.len(), 3);
    }

    #[test]
    fn test_invalid_config_reports_validation_errors() {
        let err = parse_config(
            r#"
            [haproxy]
            reload_timeout_secs = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "haproxy.reload_timeout_secs");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/haproxy-manager.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
