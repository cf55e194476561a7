//! Service entry type and registry error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named routable backend with a port and a domain-based routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    /// Unique key; also used as the backend and ACL identifier.
    pub name: String,

    /// Port the backend listens on.
    pub port: u16,

    /// Routing rule: host suffix (`.example.com`), exact host, or path prefix (`/api`).
    pub domain: String,

    /// Backend host; the renderer's default host when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Use this backend as the frontend's `default_backend`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, port: u16, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port,
            domain: domain.into(),
            host: None,
            default: false,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Check the invariants every registered entry must hold.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::invalid(&self.name, "name must not be empty"));
        }
        if !is_identifier(&self.name) {
            return Err(RegistryError::invalid(
                &self.name,
                "name may only contain letters, digits, '_', '.', ':' and '-'",
            ));
        }
        if self.port == 0 {
            return Err(RegistryError::invalid(&self.name, "port must be within 1-65535"));
        }
        if self.domain.is_empty() {
            return Err(RegistryError::invalid(&self.name, "domain must not be empty"));
        }
        if !is_domain(&self.domain) {
            return Err(RegistryError::invalid(
                &self.name,
                format!("domain '{}' may only contain host name or URL path characters", self.domain),
            ));
        }
        if let Some(host) = &self.host {
            if !is_host(host) {
                return Err(RegistryError::invalid(
                    &self.name,
                    format!("host '{}' must be a host name or IP address", host),
                ));
            }
        }
        Ok(())
    }

    /// `host:port` this entry routes to.
    pub fn target(&self, default_host: &str) -> String {
        format!("{}:{}", self.host.as_deref().unwrap_or(default_host), self.port)
    }
}

/// True when `value` is usable as an HAProxy section or ACL name.
pub fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
}

/// True when `value` only uses host name and URL path characters. Whitespace,
/// `#`, `\`, quotes, `$` and braces have meaning to the HAProxy config parser.
pub fn is_domain(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(
                    c,
                    '.' | '-' | '_' | '~' | '/' | ':' | '%' | '@' | '!' | '&' | '(' | ')' | '*' | '+' | ',' | ';' | '='
                        | '?' | '[' | ']'
                )
        })
}

/// Host name, IPv4 or bracketed IPv6 address.
fn is_host(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'))
}

/// Errors returned by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The entry violates a field invariant; the registry is untouched.
    #[error("invalid service '{name}': {reason}")]
    Validation { name: String, reason: String },

    /// Remove of a name that is not registered.
    #[error("service '{0}' is not registered")]
    NotFound(String),
}

impl RegistryError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        RegistryError::Validation {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the service the error refers to.
    pub fn service(&self) -> &str {
        match self {
            RegistryError::Validation { name, .. } => name,
            RegistryError::NotFound(name) => name,
        }
    }
}
