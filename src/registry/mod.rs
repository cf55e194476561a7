//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! RPC Add/Remove (normalized entries)
//!     → types.rs (field validation)
//!     → store.rs (serialized upsert/remove, version + dirty flag)
//!     → persist.rs (optional JSON state file, atomic replace, written
//!       outside the registry lock on the blocking pool)
//!
//! Render path:
//!     store.rs snapshot() → name-ordered copy → renderer (outside the lock)
//! ```
//!
//! # Design Decisions
//! - One mutex guards all mutations; a batch is applied under one acquisition
//! - Snapshots are copies, so rendering never holds the lock
//! - Mutations are synchronous: a cancelled caller cannot half-apply a batch
//! - Saving is a separate step so callers see (and report) a failed write

pub mod persist;
pub mod store;
pub mod types;

pub use persist::{PersistError, StateFile};
pub use store::{RegistryStats, ServiceRegistry, Snapshot};
pub use types::{RegistryError, ServiceEntry};
