//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI flags + env overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ManagerConfig (validated, immutable)
//!     → split into per-subsystem settings at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ApplyMode;
pub use schema::HaproxyConfig;
pub use schema::ListenerConfig;
pub use schema::LogFormat;
pub use schema::ManagerConfig;
pub use schema::ObservabilityConfig;
pub use schema::RenderConfig;
