//! HAProxy configuration manager.
//!
//! Keeps a registry of declared services, renders it into an HAProxy
//! configuration, and applies that configuration to a running proxy with
//! validation, bounded reloads and rollback. Driven over JSON-RPC on HTTP.

// Core subsystems
pub mod config;
pub mod registry;
pub mod reload;
pub mod render;
pub mod rpc;

// Serving
pub mod health;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ManagerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use rpc::Dispatcher;
