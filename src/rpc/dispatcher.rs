//! Method dispatch: registry mutation, then render and apply.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::ApplyMode;
use crate::health::LiveState;
use crate::observability::metrics;
use crate::registry::{RegistryError, ServiceRegistry, Snapshot};
use crate::reload::{ApplyOutcome, ReloadController, ReloadError, ReloadLedger, ReloadState};
use crate::render::{self, RenderSettings, RenderedConfig};
use crate::rpc::error::RpcError;
use crate::rpc::protocol::{
    decode_name, decode_service, first_param, ApplyReport, CallParams, GenerateReport, ItemReport,
    MutationReport, RpcRequest, RpcResponse,
};

/// Methods served under the `Haproxy` receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Add,
    Remove,
    Generate,
    BringIntoLb,
    BringOutOfLb,
    LockForReload,
    ReleaseReloadLock,
    CheckReloadStatus,
}

impl Method {
    /// Accepts `Haproxy.<Method>` or a bare `<Method>`.
    pub fn parse(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("Haproxy.").unwrap_or(name);
        match bare {
            "Add" => Some(Method::Add),
            "Remove" => Some(Method::Remove),
            "Generate" => Some(Method::Generate),
            "BringIntoLB" => Some(Method::BringIntoLb),
            "BringOutOfLB" => Some(Method::BringOutOfLb),
            "LockForReload" => Some(Method::LockForReload),
            "ReleaseReloadLock" => Some(Method::ReleaseReloadLock),
            "CheckReloadStatus" => Some(Method::CheckReloadStatus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Add => "Add",
            Method::Remove => "Remove",
            Method::Generate => "Generate",
            Method::BringIntoLb => "BringIntoLB",
            Method::BringOutOfLb => "BringOutOfLB",
            Method::LockForReload => "LockForReload",
            Method::ReleaseReloadLock => "ReleaseReloadLock",
            Method::CheckReloadStatus => "CheckReloadStatus",
        }
    }
}

/// Result and error of one call, before the JSON-RPC envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub result: Value,
    pub error: Option<String>,
}

impl Dispatched {
    fn ok(result: impl Serialize) -> Self {
        Self {
            result: to_value(result),
            error: None,
        }
    }

    fn failed(error: &RpcError) -> Self {
        Self {
            result: Value::Null,
            error: Some(error.to_wire()),
        }
    }

    fn from_result<T: Serialize>(result: Result<T, RpcError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::failed(&e),
        }
    }
}

/// Routes RPC calls to the registry and the reload controller.
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    controller: Arc<ReloadController>,
    ledger: Arc<ReloadLedger>,
    render: RenderSettings,
    mode: ApplyMode,
    live: Arc<LiveState>,
}

impl Dispatcher {
    /// Services already registered but not yet applied start out pending.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        controller: Arc<ReloadController>,
        render: RenderSettings,
        mode: ApplyMode,
        live: Arc<LiveState>,
    ) -> Self {
        let ledger = Arc::new(ReloadLedger::new());
        if registry.is_dirty() {
            let snapshot = registry.snapshot();
            ledger.mark_pending(snapshot.entries.iter().map(|e| e.name.as_str()), snapshot.version);
        }

        Self {
            registry,
            controller,
            ledger,
            render,
            mode,
            live,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &Arc<ReloadController> {
        &self.controller
    }

    pub fn ledger(&self) -> &Arc<ReloadLedger> {
        &self.ledger
    }

    pub fn live(&self) -> &Arc<LiveState> {
        &self.live
    }

    /// Handle a decoded request and wrap the outcome in a response.
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let Dispatched { result, error } = self.dispatch(&request.method, request.params).await;
        RpcResponse {
            id: request.id,
            result,
            error,
        }
    }

    pub async fn dispatch(&self, method: &str, params: Value) -> Dispatched {
        let started = Instant::now();

        let dispatched = match Method::parse(method) {
            None => {
                tracing::warn!(method = %method, "Unknown RPC method");
                Dispatched::failed(&RpcError::MethodNotFound(method.to_string()))
            }
            Some(Method::Add) => self.add(params).await,
            Some(Method::Remove) => self.remove(params).await,
            Some(Method::Generate) => Dispatched::from_result(self.generate().await),
            Some(Method::BringIntoLb) => {
                self.live.set(true);
                Dispatched::ok(1)
            }
            Some(Method::BringOutOfLb) => {
                self.live.set(false);
                Dispatched::ok(1)
            }
            Some(Method::LockForReload) => {
                Dispatched::from_result(self.controller.lock().await.map(|_| 1).map_err(RpcError::from))
            }
            Some(Method::ReleaseReloadLock) => {
                Dispatched::from_result(self.controller.unlock().await.map(|_| 1).map_err(RpcError::from))
            }
            Some(Method::CheckReloadStatus) => {
                Dispatched::from_result(self.check_reload_status(params).map(|_| 1))
            }
        };

        let label = Method::parse(method).map(|m| m.as_str()).unwrap_or("unknown");
        let outcome = if dispatched.error.is_some() { "error" } else { "ok" };
        metrics::record_rpc(label, outcome, started.elapsed());
        tracing::info!(
            method = label,
            outcome,
            error = dispatched.error.as_deref().unwrap_or(""),
            latency_ms = started.elapsed().as_millis() as u64,
            "RPC handled"
        );

        dispatched
    }

    /// Upsert one or many services, then apply per the apply mode.
    pub async fn add(&self, params: Value) -> Dispatched {
        let call = match CallParams::decode(params) {
            Ok(call) => call,
            Err(e) => return Dispatched::failed(&e),
        };

        let decoded: Vec<_> = call.services.into_vec().into_iter().map(decode_service).collect();
        let valid = decoded.iter().filter_map(|d| d.as_ref().ok().cloned()).collect();

        let before = self.registry.stats().version;
        let mut committed = self.registry.upsert_batch(valid).into_iter();
        let results: Vec<(String, Result<(), RegistryError>)> = decoded
            .into_iter()
            .map(|d| match d {
                Ok(entry) => (entry.name, committed.next().unwrap_or(Ok(()))),
                Err(e) => (e.service().to_string(), Err(e)),
            })
            .collect();

        self.finish_mutation(results, before, call.apply).await
    }

    /// Remove one or many services; unknown names are reported per item.
    pub async fn remove(&self, params: Value) -> Dispatched {
        let call = match CallParams::decode(params) {
            Ok(call) => call,
            Err(e) => return Dispatched::failed(&e),
        };

        let decoded: Vec<_> = call.services.into_vec().into_iter().map(decode_name).collect();
        let names: Vec<String> = decoded.iter().filter_map(|d| d.as_ref().ok().cloned()).collect();

        let before = self.registry.stats().version;
        let mut removed = self.registry.remove_batch(&names).into_iter();
        let results: Vec<(String, Result<(), RegistryError>)> = decoded
            .into_iter()
            .map(|d| match d {
                Ok(name) => {
                    let result = removed.next().unwrap_or_else(|| Err(RegistryError::NotFound(name.clone())));
                    (name, result.map(|_| ()))
                }
                Err(e) => (e.service().to_string(), Err(e)),
            })
            .collect();

        self.finish_mutation(results, before, call.apply).await
    }

    /// Render the current registry and apply it, dirty or not.
    pub async fn generate(&self) -> Result<GenerateReport, RpcError> {
        let snapshot = self.registry.snapshot();
        let services = snapshot.entries.len();
        let (outcome, version) = self.apply_snapshot(snapshot).await?;

        Ok(GenerateReport {
            outcome: outcome.label().to_string(),
            version,
            services,
        })
    }

    /// Whether the latest change to `Name` is in force.
    ///
    /// `LockedError` while the maintenance lock is held, `PendingError` until
    /// an apply covers the change, `ReloadError` if that apply failed.
    pub fn check_reload_status(&self, params: Value) -> Result<(), RpcError> {
        let name = decode_name(Value::Object(first_param(params)?))?;

        if let Some(lock) = self.controller.locked() {
            return Err(ReloadError::Locked(lock).into());
        }

        match self.ledger.state(&name) {
            None => Err(RegistryError::NotFound(name).into()),
            Some(ReloadState::Applied) => Ok(()),
            Some(ReloadState::Pending) => Err(RpcError::Pending(name)),
            Some(ReloadState::Failed(error)) => Err(RpcError::ReloadFailed { name, error }),
        }
    }

    async fn apply_snapshot(&self, snapshot: Snapshot) -> Result<(ApplyOutcome, u64), RpcError> {
        let version = snapshot.version;
        let rendered = match render::render(&snapshot, &self.render) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(version, error = %e, "Render refused conflicting registry");
                let e = RpcError::from(e);
                self.ledger.settle_failed(version, &e.to_string());
                return Err(e);
            }
        };

        // Detached: once started, an apply runs to completion (including any
        // rollback) even if the caller goes away.
        let task = tokio::spawn(apply_detached(
            self.controller.clone(),
            self.registry.clone(),
            self.ledger.clone(),
            rendered,
        ));
        let outcome = task
            .await
            .map_err(|e| RpcError::Internal(format!("apply of configuration v{} aborted: {}", version, e)))??;
        Ok((outcome, version))
    }

    /// Save the registry on the blocking pool.
    async fn persist(&self) -> Result<(), RpcError> {
        if !self.registry.is_persistent() {
            return Ok(());
        }
        let registry = self.registry.clone();
        match tokio::task::spawn_blocking(move || registry.persist()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(path = %e.path.display(), error = %e.source, "Failed to persist registry");
                metrics::record_persist_failure();
                Err(e.into())
            }
            Err(e) => Err(RpcError::Internal(format!("registry save aborted: {}", e))),
        }
    }

    async fn finish_mutation(
        &self,
        results: Vec<(String, Result<(), RegistryError>)>,
        before: u64,
        apply: Option<bool>,
    ) -> Dispatched {
        let version = self.registry.stats().version;
        let changed = version != before;

        let mut persist_error = None;
        if changed {
            let touched = results.iter().filter(|(_, r)| r.is_ok()).map(|(name, _)| name.as_str());
            self.ledger.mark_pending(touched, version);
            persist_error = self.persist().await.err().map(|e| e.to_wire());
        }

        let mut validation_errors = Vec::new();
        let services = results
            .into_iter()
            .map(|(name, result)| match result {
                Ok(()) => ItemReport {
                    name,
                    ok: true,
                    error: None,
                },
                Err(e) => {
                    let e = RpcError::from(e);
                    if e.kind() == "ValidationError" {
                        validation_errors.push(e.to_string());
                    }
                    ItemReport {
                        name,
                        ok: false,
                        error: Some(e.to_wire()),
                    }
                }
            })
            .collect();

        let auto = apply.unwrap_or(self.mode == ApplyMode::Auto);
        let mut apply_error = None;
        let apply = if !changed {
            ApplyReport {
                outcome: "Skipped".to_string(),
                version,
                error: None,
            }
        } else if !auto {
            ApplyReport {
                outcome: "Staged".to_string(),
                version,
                error: None,
            }
        } else {
            let snapshot = self.registry.snapshot();
            let version = snapshot.version;
            match self.apply_snapshot(snapshot).await {
                Ok((outcome, version)) => ApplyReport {
                    outcome: outcome.label().to_string(),
                    version,
                    error: None,
                },
                Err(e) => {
                    let wire = e.to_wire();
                    apply_error = Some(wire.clone());
                    ApplyReport {
                        outcome: "Failed".to_string(),
                        version,
                        error: Some(wire),
                    }
                }
            }
        };

        let error = apply_error.or_else(|| persist_error.clone()).or_else(|| {
            (!validation_errors.is_empty())
                .then(|| format!("ValidationError: {}", validation_errors.join("; ")))
        });

        Dispatched {
            result: to_value(MutationReport {
                services,
                apply,
                persist_error,
            }),
            error,
        }
    }
}

/// Apply `rendered` and record the result against the registry and ledger.
async fn apply_detached(
    controller: Arc<ReloadController>,
    registry: Arc<ServiceRegistry>,
    ledger: Arc<ReloadLedger>,
    rendered: RenderedConfig,
) -> Result<ApplyOutcome, ReloadError> {
    let version = rendered.version();
    let result = controller.apply(&rendered).await;
    match &result {
        Ok(ApplyOutcome::Superseded) => {}
        Ok(_) => {
            registry.mark_clean(version);
            ledger.settle_applied(version);
        }
        Err(e) => ledger.settle_failed(version, &e.to_string()),
    }
    result
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "SerializationError": e.to_string() }))
}
