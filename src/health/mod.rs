//! Health subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy health (probe.rs):
//!     Reload controller after a reload / rollback
//!     → HTTP GET monitor URI
//!     → healthy / unhealthy
//!
//! Manager liveness (state.rs):
//!     Startup / BringIntoLB / BringOutOfLB
//!     → HEAD /health
//! ```

pub mod probe;
pub mod state;

pub use probe::HealthProbe;
pub use state::LiveState;
