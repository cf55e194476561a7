//! Startup orchestration.
//!
//! # Responsibilities
//! - Read the preamble and restore the registry
//! - Bootstrap the reload controller against the running proxy
//! - Assemble the dispatcher the HTTP server serves
//!
//! # Design Decisions
//! - Fail fast: an unreadable preamble or registry state file is fatal
//! - A restored registry is not applied here; `Generate` or SIGHUP does that
//! - The manager only reports live once the proxy was verified healthy

use std::sync::Arc;

use thiserror::Error;

use crate::config::loader::{load_preamble, ConfigError};
use crate::config::ManagerConfig;
use crate::health::LiveState;
use crate::registry::{ServiceRegistry, StateFile};
use crate::reload::{HaproxyProcess, ProxyControl, ReloadController, ReloadSettings};
use crate::render::RenderSettings;
use crate::rpc::Dispatcher;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load preamble: {0}")]
    Preamble(#[from] ConfigError),

    #[error("failed to restore registry from {path}: {source}")]
    Registry {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Build the dispatcher against the HAProxy described by `config`.
pub async fn build(config: &ManagerConfig) -> Result<Arc<Dispatcher>, StartupError> {
    let proxy = Arc::new(HaproxyProcess::new(&config.haproxy));
    build_with_proxy(config, proxy).await
}

/// Build the dispatcher against any [`ProxyControl`].
pub async fn build_with_proxy(
    config: &ManagerConfig,
    proxy: Arc<dyn ProxyControl>,
) -> Result<Arc<Dispatcher>, StartupError> {
    let preamble = load_preamble(config.render.preamble_path.as_deref())?;
    let render = RenderSettings::from_config(&config.render, preamble);

    let registry = match &config.registry.state_path {
        Some(path) => ServiceRegistry::restore(StateFile::new(path)).map_err(|source| StartupError::Registry {
            path: path.display().to_string(),
            source,
        })?,
        None => ServiceRegistry::new(),
    };
    let stats = registry.stats();

    let controller = ReloadController::new(proxy, ReloadSettings::from_config(&config.haproxy));
    let verified = controller.bootstrap().await;

    tracing::info!(
        services = stats.services,
        dirty = stats.dirty,
        verified,
        apply_mode = ?config.registry.apply_mode,
        "Manager initialised"
    );

    Ok(Arc::new(Dispatcher::new(
        Arc::new(registry),
        Arc::new(controller),
        render,
        config.registry.apply_mode,
        Arc::new(LiveState::new(verified)),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceEntry;

    #[tokio::test]
    async fn test_restored_registry_stays_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("registry.json");
        let file = StateFile::new(&state_path);
        let entry = ServiceEntry::new("a", 80, ".a.com");
        file.save(&[&entry]).unwrap();

        let mut config = ManagerConfig::default();
        config.registry.state_path = Some(state_path);
        config.haproxy.config_path = dir.path().join("haproxy.cfg");

        let dispatcher = build(&config).await.unwrap();

        assert_eq!(dispatcher.registry().get("a"), Some(entry));
        assert!(dispatcher.registry().is_dirty());
        // No live config to adopt, so the manager starts out of rotation.
        assert!(!dispatcher.live().is_live());
        assert!(!dir.path().join("haproxy.cfg").exists());
    }

    #[tokio::test]
    async fn test_missing_preamble_is_fatal() {
        let mut config = ManagerConfig::default();
        config.render.preamble_path = Some("/nonexistent/preamble.cfg".into());
        config.haproxy.config_path = "/nonexistent/haproxy.cfg".into();

        assert!(matches!(build(&config).await, Err(StartupError::Preamble(_))));
    }
}
