//! Configuration rendering subsystem.
//!
//! # Data Flow
//! ```text
//! Snapshot (name-ordered entries, version)
//!     → renderer.rs conflict check (domain → target, single default)
//!     → rule.rs (domain → ACL criterion)
//!     → RenderedConfig (text + snapshot version)
//! ```
//!
//! # Design Decisions
//! - Pure function: no I/O, safe to run outside the registry lock
//! - Deterministic: same snapshot always yields the same bytes
//! - Conflicts are reported, never resolved by picking a winner

pub mod renderer;
pub mod rule;

pub use renderer::{render, RenderError, RenderSettings, RenderedConfig, DEFAULT_PREAMBLE};
pub use rule::DomainRule;
