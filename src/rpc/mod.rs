//! RPC subsystem.
//!
//! # Data Flow
//! ```text
//! POST /haproxy body
//!     → protocol.rs (RpcRequest, params[0], one-or-many normalisation)
//!     → dispatcher.rs
//!         Add/Remove → ServiceRegistry batch → [render → ReloadController::apply]
//!         Generate   → snapshot → render → ReloadController::apply
//!         BringIntoLB / BringOutOfLB → LiveState
//!         LockForReload / ReleaseReloadLock → ReloadController lock file
//!         CheckReloadStatus → ReloadLedger (pending, applied, failed)
//!     → RpcResponse {id, result, error}
//! ```
//!
//! # Design Decisions
//! - Errors travel as `"<Kind>: <message>"` strings, never as HTTP failures
//! - Per-item failures are reported per item; valid items still commit
//! - A failed apply leaves the registry as committed and marked dirty
//! - Applies run in their own task; dropping a call never interrupts one

pub mod dispatcher;
pub mod error;
pub mod protocol;

pub use dispatcher::{Dispatched, Dispatcher, Method};
pub use error::RpcError;
pub use protocol::{RpcRequest, RpcResponse};
