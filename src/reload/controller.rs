//! Apply orchestration: write, reload, verify, roll back.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::HaproxyConfig;
use crate::observability::metrics;
use crate::reload::control::ProxyControl;
use crate::reload::error::{ApplyStage, ReloadError, RollbackOutcome};
use crate::render::RenderedConfig;
use crate::resilience::backoff::probe_delay;
use crate::resilience::timeouts::Deadline;

/// Probe intervals grow up to this multiple of the base interval.
const MAX_PROBE_BACKOFF: u32 = 8;

/// Timing and policy knobs for [`ReloadController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSettings {
    pub reload_timeout: Duration,
    pub health_timeout: Duration,
    pub probe_interval: Duration,
    pub allow_unverified_bootstrap: bool,
}

impl ReloadSettings {
    pub fn from_config(config: &HaproxyConfig) -> Self {
        Self {
            reload_timeout: Duration::from_secs(config.reload_timeout_secs),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
            probe_interval: Duration::from_millis(config.probe_interval_ms),
            allow_unverified_bootstrap: config.allow_unverified_bootstrap,
        }
    }
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self::from_config(&HaproxyConfig::default())
    }
}

/// Successful result of [`ReloadController::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplyOutcome {
    /// Written, reloaded and verified healthy.
    Applied,
    /// Identical to the configuration already in force; nothing was reloaded.
    Unchanged,
    /// A newer snapshot has already been applied; nothing was written.
    Superseded,
}

impl ApplyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::Applied => "Applied",
            ApplyOutcome::Unchanged => "Unchanged",
            ApplyOutcome::Superseded => "Superseded",
        }
    }
}

/// Last apply attempt, as reported by `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyStatus {
    /// Snapshot version the proxy is running, if any has been applied.
    pub version: Option<u64>,
    pub outcome: Option<String>,
    /// Whether the configuration in force was last seen healthy.
    pub healthy: bool,
    pub error: Option<String>,
    pub at_unix_secs: u64,
}

impl ApplyStatus {
    fn initial(healthy: bool) -> Self {
        Self {
            version: None,
            outcome: None,
            healthy,
            error: None,
            at_unix_secs: unix_now(),
        }
    }
}

#[derive(Debug, Default)]
struct ControllerState {
    /// Text of the last configuration verified healthy.
    last_good: Option<String>,
    /// Highest snapshot version applied (or found unchanged).
    applied_version: Option<u64>,
}

/// Serialises applies against one proxy and keeps it on a known-good config.
pub struct ReloadController {
    proxy: Arc<dyn ProxyControl>,
    settings: ReloadSettings,
    state: Mutex<ControllerState>,
    status: ArcSwap<ApplyStatus>,
}

impl ReloadController {
    pub fn new(proxy: Arc<dyn ProxyControl>, settings: ReloadSettings) -> Self {
        Self {
            proxy,
            settings,
            state: Mutex::new(ControllerState::default()),
            status: ArcSwap::from_pointee(ApplyStatus::initial(false)),
        }
    }

    /// Adopt the configuration already in place if the proxy is healthy on it.
    ///
    /// Returns whether a verified last-known-good configuration exists.
    pub async fn bootstrap(&self) -> bool {
        let mut state = self.state.lock().await;

        let current = match self.proxy.read_current_config().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::warn!("No proxy configuration in place; first apply has nothing to fall back to");
                return false;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read the proxy configuration");
                return false;
            }
        };

        if !self.wait_healthy().await {
            tracing::warn!("Proxy is not healthy on its current configuration; not adopting it");
            return false;
        }

        tracing::info!(bytes = current.len(), "Adopted current proxy configuration as last-known-good");
        state.last_good = Some(current);
        self.status.store(Arc::new(ApplyStatus::initial(true)));
        true
    }

    /// Make `rendered` the configuration in force.
    ///
    /// Applies are serialised. A snapshot older than one already applied is
    /// reported as [`ApplyOutcome::Superseded`] and never written. Any failure
    /// after the new file was committed restores the last-known-good
    /// configuration before returning.
    pub async fn apply(&self, rendered: &RenderedConfig) -> Result<ApplyOutcome, ReloadError> {
        let started = Instant::now();
        let mut state = self.state.lock().await;
        let result = self.apply_locked(&mut state, rendered).await;

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.label(),
        };
        metrics::record_apply(label, started.elapsed());

        match &result {
            Ok(ApplyOutcome::Superseded) => {}
            Ok(outcome) => self.publish(ApplyStatus {
                version: Some(rendered.version()),
                outcome: Some(outcome.label().to_string()),
                healthy: true,
                error: None,
                at_unix_secs: unix_now(),
            }),
            Err(e) => {
                let previous = self.status.load();
                let healthy = match e {
                    ReloadError::Failed { rollback, .. } => *rollback == RollbackOutcome::Restored,
                    _ => previous.healthy,
                };
                self.publish(ApplyStatus {
                    version: previous.version,
                    outcome: Some("Failed".to_string()),
                    healthy,
                    error: Some(e.to_string()),
                    at_unix_secs: unix_now(),
                });
            }
        }

        result
    }

    /// Latest apply status.
    pub fn status(&self) -> Arc<ApplyStatus> {
        self.status.load_full()
    }

    pub fn settings(&self) -> &ReloadSettings {
        &self.settings
    }

    /// Take the maintenance lock once any in-flight apply has finished.
    /// Later applies fail with [`ReloadError::Locked`] until [`unlock`](Self::unlock).
    pub async fn lock(&self) -> Result<PathBuf, ReloadError> {
        let _state = self.state.lock().await;
        let path = self.set_lock(true).await?;
        tracing::info!(lock = %path.display(), "Maintenance lock taken");
        Ok(path)
    }

    /// Release the maintenance lock. Releasing a lock that is not held succeeds.
    pub async fn unlock(&self) -> Result<PathBuf, ReloadError> {
        let _state = self.state.lock().await;
        let path = self.set_lock(false).await?;
        tracing::info!(lock = %path.display(), "Maintenance lock released");
        Ok(path)
    }

    /// Maintenance lock currently held, if any.
    pub fn locked(&self) -> Option<PathBuf> {
        self.proxy.lock_held()
    }

    async fn set_lock(&self, held: bool) -> Result<PathBuf, ReloadError> {
        match self.proxy.set_lock(held).await {
            Ok(Some(path)) => Ok(path),
            Ok(None) => Err(ReloadError::LockUnavailable),
            Err(e) => Err(ReloadError::LockFile(e)),
        }
    }

    async fn apply_locked(
        &self,
        state: &mut ControllerState,
        rendered: &RenderedConfig,
    ) -> Result<ApplyOutcome, ReloadError> {
        let version = rendered.version();

        if let Some(applied) = state.applied_version {
            if version < applied {
                tracing::info!(version, applied, "Skipping superseded configuration");
                return Ok(ApplyOutcome::Superseded);
            }
        }

        if let Some(lock) = self.proxy.lock_held() {
            tracing::warn!(lock = %lock.display(), version, "Apply refused: maintenance lock held");
            return Err(ReloadError::Locked(lock));
        }

        if state.last_good.is_none() && !self.settings.allow_unverified_bootstrap {
            tracing::error!(version, "Apply refused: no verified configuration to fall back to");
            return Err(ReloadError::Bootstrap { version });
        }

        let current = self
            .proxy
            .read_current_config()
            .await
            .map_err(ReloadError::Read)?;

        if state.last_good.as_deref() == Some(rendered.text())
            && current.as_deref() == Some(rendered.text())
        {
            tracing::debug!(version, "Configuration unchanged; skipping reload");
            state.applied_version = Some(version);
            return Ok(ApplyOutcome::Unchanged);
        }

        if let Err(source) = self.proxy.write_config(rendered.text()).await {
            tracing::warn!(version, error = %source, "Proxy rejected configuration");
            return Err(ReloadError::Rejected { version, source });
        }

        match self.reload_and_verify().await {
            Ok(()) => {
                tracing::info!(version, bytes = rendered.text().len(), "Configuration applied");
                state.last_good = Some(rendered.text().to_string());
                state.applied_version = Some(version);
                Ok(ApplyOutcome::Applied)
            }
            Err((stage, detail)) => {
                tracing::error!(version, stage = %stage, detail = %detail, "Apply failed; rolling back");
                let target = state.last_good.clone().or(current);
                let rollback = self.rollback(target).await;
                Err(ReloadError::Failed {
                    version,
                    stage,
                    detail,
                    rollback,
                })
            }
        }
    }

    async fn reload_and_verify(&self) -> Result<(), (ApplyStage, String)> {
        match tokio::time::timeout(self.settings.reload_timeout, self.proxy.trigger_reload()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err((ApplyStage::Reload, e.to_string())),
            Err(_) => {
                return Err((
                    ApplyStage::Reload,
                    format!("reload did not finish within {:?}", self.settings.reload_timeout),
                ))
            }
        }

        if self.wait_healthy().await {
            Ok(())
        } else {
            Err((
                ApplyStage::HealthCheck,
                format!("proxy not healthy within {:?}", self.settings.health_timeout),
            ))
        }
    }

    /// Probe until healthy or the health budget runs out.
    async fn wait_healthy(&self) -> bool {
        let deadline = Deadline::after(self.settings.health_timeout);
        let base = self.settings.probe_interval;
        let max = base.saturating_mul(MAX_PROBE_BACKOFF);
        let mut attempt = 0;

        loop {
            let probe = tokio::time::timeout(deadline.remaining(), self.proxy.health_check()).await;
            if matches!(probe, Ok(true)) {
                return true;
            }
            if deadline.expired() {
                return false;
            }

            attempt += 1;
            let delay = probe_delay(attempt, base, max).min(deadline.remaining());
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Proxy not healthy yet");
            tokio::time::sleep(delay).await;
        }
    }

    async fn rollback(&self, target: Option<String>) -> RollbackOutcome {
        let outcome = match target {
            None => RollbackOutcome::NothingToRestore,
            Some(text) => match self.proxy.write_config(&text).await {
                Err(e) => RollbackOutcome::Failed(format!("restoring previous configuration: {}", e)),
                Ok(()) => match self.reload_and_verify().await {
                    Ok(()) => RollbackOutcome::Restored,
                    Err((stage, detail)) => RollbackOutcome::Failed(format!("{}: {}", stage, detail)),
                },
            },
        };

        match &outcome {
            RollbackOutcome::Restored => tracing::info!("Rolled back to last-known-good configuration"),
            RollbackOutcome::NothingToRestore => tracing::warn!("No previous configuration to roll back to"),
            RollbackOutcome::Failed(detail) => {
                tracing::error!(detail = %detail, "Rollback failed; proxy may be degraded")
            }
        }
        metrics::record_rollback(outcome.label());
        outcome
    }

    fn publish(&self, status: ApplyStatus) {
        self.status.store(Arc::new(status));
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
