//! Reload subsystem.
//!
//! # Data Flow
//! ```text
//! RenderedConfig
//!     → controller.rs (serialise, supersede check, lock and bootstrap checks)
//!     → control.rs (ProxyControl seam)
//!         → process.rs: stage temp file (atomic.rs) → `haproxy -c` → rename
//!         → process.rs: reload command (bounded)
//!         → health probe until healthy (bounded, backoff)
//!     → on failure: restore last-known-good, reload, re-verify
//!
//! ledger.rs: per-service pending/applied/failed state, settled by applies
//! controller.rs lock()/unlock(): maintenance lock file, taken between applies
//! ```
//!
//! # Design Decisions
//! - One apply at a time; newer snapshots win over older ones
//! - The live file is only ever replaced by rename of a validated candidate
//! - The controller never touches files or processes; the adapter does
//! - Without a verified fallback, applies fail closed unless configured otherwise

pub mod atomic;
pub mod control;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod process;

pub use control::ProxyControl;
pub use controller::{ApplyOutcome, ApplyStatus, ReloadController, ReloadSettings};
pub use error::{ApplyStage, ProxyError, ReloadError, RollbackOutcome};
pub use ledger::{ReloadLedger, ReloadState};
pub use process::HaproxyProcess;
