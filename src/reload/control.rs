//! Interface to the external proxy process.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::reload::error::ProxyError;

/// Everything the reload controller may do to the running proxy.
///
/// Business logic never touches the proxy's files or process directly; it
/// goes through this trait so the controller can be exercised against a fake.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Configuration currently in place, `None` if there is none yet.
    async fn read_current_config(&self) -> Result<Option<String>, ProxyError>;

    /// Validate `text` and, only if accepted, replace the live configuration
    /// atomically. On error the live configuration is unchanged.
    async fn write_config(&self, text: &str) -> Result<(), ProxyError>;

    /// Make the proxy pick up the live configuration.
    async fn trigger_reload(&self) -> Result<(), ProxyError>;

    /// One health probe of the running proxy.
    async fn health_check(&self) -> bool;

    /// Maintenance lock currently held, if any.
    fn lock_held(&self) -> Option<PathBuf> {
        None
    }

    /// Create (`held`) or remove the maintenance lock and return its path.
    /// `None` when this proxy has no lock file.
    async fn set_lock(&self, _held: bool) -> Result<Option<PathBuf>, ProxyError> {
        Ok(None)
    }
}
