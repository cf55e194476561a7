//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that external commands and probe URLs are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ManagerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ManagerConfig;
use crate::registry::types::is_identifier;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ManagerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    let haproxy = &config.haproxy;
    if haproxy.config_path.as_os_str().is_empty() {
        errors.push(ValidationError::new("haproxy.config_path", "must not be empty"));
    }
    if haproxy.check_command.is_empty() {
        errors.push(ValidationError::new("haproxy.check_command", "must not be empty"));
    }
    if haproxy.reload_command.is_empty() {
        errors.push(ValidationError::new("haproxy.reload_command", "must not be empty"));
    }
    if haproxy.reload_timeout_secs == 0 {
        errors.push(ValidationError::new("haproxy.reload_timeout_secs", "must be > 0"));
    }
    if haproxy.health_timeout_secs == 0 {
        errors.push(ValidationError::new("haproxy.health_timeout_secs", "must be > 0"));
    }
    if haproxy.probe_timeout_ms == 0 {
        errors.push(ValidationError::new("haproxy.probe_timeout_ms", "must be > 0"));
    }
    if let Some(raw) = &haproxy.health_url {
        match url::Url::parse(raw) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => errors.push(ValidationError::new(
                "haproxy.health_url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "haproxy.health_url",
                format!("'{}' is not a URL: {}", raw, e),
            )),
        }
    }

    let render = &config.render;
    if !is_identifier(&render.frontend_name) {
        errors.push(ValidationError::new(
            "render.frontend_name",
            format!("'{}' is not a valid section name", render.frontend_name),
        ));
    }
    if render.bind.trim().is_empty() {
        errors.push(ValidationError::new("render.bind", "must not be empty"));
    }
    if render.backend_host.trim().is_empty() || render.backend_host.contains(char::is_whitespace) {
        errors.push(ValidationError::new(
            "render.backend_host",
            "must be a host without whitespace",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ManagerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ManagerConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.haproxy.reload_command.clear();
        config.haproxy.health_url = Some("ftp://example.com/health".into());
        config.render.frontend_name = "http in".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();

        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "haproxy.reload_command",
                "haproxy.health_url",
                "render.frontend_name",
            ]
        );
    }
}
