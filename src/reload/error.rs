//! Reload error definitions.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`ProxyControl`](crate::reload::ProxyControl) implementation.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A check or reload command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {output}")]
    Rejected {
        command: String,
        status: String,
        output: String,
    },

    /// A command did not finish in time and was killed.
    #[error("`{command}` did not finish within {secs}s")]
    Timeout { command: String, secs: u64 },

    /// A command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command is empty")]
    EmptyCommand,

    #[error("configuration file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Step of an apply that failed after the new file was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    Reload,
    HealthCheck,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyStage::Reload => write!(f, "reload"),
            ApplyStage::HealthCheck => write!(f, "health check"),
        }
    }
}

/// What happened when falling back after a failed apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The last known-good configuration is back in place and healthy.
    Restored,
    /// There was no earlier configuration to go back to.
    NothingToRestore,
    /// Restoring failed too; the proxy may be degraded.
    Failed(String),
}

impl RollbackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RollbackOutcome::Restored => "restored",
            RollbackOutcome::NothingToRestore => "nothing_to_restore",
            RollbackOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackOutcome::Restored => write!(f, "rolled back to the last known-good configuration"),
            RollbackOutcome::NothingToRestore => write!(f, "no previous configuration to roll back to"),
            RollbackOutcome::Failed(detail) => write!(f, "rollback failed: {}", detail),
        }
    }
}

/// Errors returned by [`ReloadController::apply`](crate::reload::ReloadController::apply).
#[derive(Debug, Error)]
pub enum ReloadError {
    /// The candidate was refused before it replaced the live file.
    #[error("configuration v{version} was not accepted: {source}; previous configuration still in effect")]
    Rejected {
        version: u64,
        #[source]
        source: ProxyError,
    },

    /// The committed configuration failed to reload or come up healthy.
    #[error("{stage} failed for configuration v{version}: {detail}; {rollback}")]
    Failed {
        version: u64,
        stage: ApplyStage,
        detail: String,
        rollback: RollbackOutcome,
    },

    /// No verified configuration exists to fall back to.
    #[error("no verified configuration to fall back to; refusing to apply v{version}")]
    Bootstrap { version: u64 },

    /// A maintenance lock file is present.
    #[error("applies are locked while {} exists", .0.display())]
    Locked(PathBuf),

    #[error("could not read the current configuration: {0}")]
    Read(#[source] ProxyError),

    #[error("no maintenance lock file is configured (haproxy.lock_path)")]
    LockUnavailable,

    #[error("failed to update the maintenance lock: {0}")]
    LockFile(#[source] ProxyError),
}

impl ReloadError {
    /// Short label for metrics and status.
    pub fn label(&self) -> &'static str {
        match self {
            ReloadError::Rejected { .. } => "rejected",
            ReloadError::Failed { .. } => "failed",
            ReloadError::Bootstrap { .. } => "bootstrap",
            ReloadError::Locked(_) => "locked",
            ReloadError::Read(_) => "read_error",
            ReloadError::LockUnavailable => "lock_unavailable",
            ReloadError::LockFile(_) => "lock_error",
        }
    }
}
