//! RPC error taxonomy and its wire form.

use thiserror::Error;

use crate::registry::{PersistError, RegistryError};
use crate::reload::ReloadError;
use crate::render::RenderError;

/// Every failure a caller can see, tagged with a stable kind.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error("{0}")]
    InvalidParams(String),

    #[error("unknown method '{0}'")]
    MethodNotFound(String),

    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("service '{0}' is waiting for a reload")]
    Pending(String),

    #[error("last reload including service '{name}' failed: {error}")]
    ReloadFailed { name: String, error: String },

    #[error("call did not finish within {0}s; the apply continues in the background (see GET /status)")]
    TimedOut(u64),

    #[error("{0}")]
    Internal(String),
}

impl RpcError {
    /// Error kind as sent on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Registry(RegistryError::Validation { .. }) => "ValidationError",
            RpcError::Registry(RegistryError::NotFound(_)) => "NotFoundError",
            RpcError::Render(_) => "ConflictError",
            RpcError::Reload(ReloadError::Bootstrap { .. }) => "BootstrapError",
            RpcError::Reload(ReloadError::Locked(_)) => "LockedError",
            RpcError::Reload(_) => "ReloadError",
            RpcError::InvalidParams(_) => "InvalidParams",
            RpcError::MethodNotFound(_) => "MethodNotFound",
            RpcError::Parse(_) => "ParseError",
            RpcError::Persist(_) => "PersistenceError",
            RpcError::Pending(_) => "PendingError",
            RpcError::ReloadFailed { .. } | RpcError::TimedOut(_) => "ReloadError",
            RpcError::Internal(_) => "InternalError",
        }
    }

    /// `"<Kind>: <message>"`, the JSON-RPC `error` string.
    pub fn to_wire(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_wire_form() {
        let err = RpcError::from(RegistryError::NotFound("missing".into()));
        assert_eq!(err.to_wire(), "NotFoundError: service 'missing' is not registered");

        let err = RpcError::from(RenderError::DefaultConflict {
            first: "a".into(),
            second: "b".into(),
        });
        assert_eq!(
            err.to_wire(),
            "ConflictError: both 'a' and 'b' are marked as the default backend"
        );
    }

    #[test]
    fn test_reload_kinds() {
        assert_eq!(
            RpcError::from(ReloadError::Bootstrap { version: 1 }).kind(),
            "BootstrapError"
        );
        assert_eq!(
            RpcError::from(ReloadError::Locked(PathBuf::from("/lock"))).kind(),
            "LockedError"
        );
        assert_eq!(
            RpcError::MethodNotFound("Haproxy.Nope".into()).to_wire(),
            "MethodNotFound: unknown method 'Haproxy.Nope'"
        );
    }

    #[test]
    fn test_reload_status_kinds() {
        assert_eq!(
            RpcError::Pending("a".into()).to_wire(),
            "PendingError: service 'a' is waiting for a reload"
        );
        assert_eq!(RpcError::TimedOut(120).kind(), "ReloadError");
        assert_eq!(RpcError::from(ReloadError::LockUnavailable).kind(), "ReloadError");
    }
}
