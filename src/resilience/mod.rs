//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Apply (reload controller):
//!     → timeouts.rs (one deadline per reload/health wait)
//!     → backoff.rs (spacing between health probes)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Probing backs off exponentially but never past the deadline

pub mod backoff;
pub mod timeouts;
