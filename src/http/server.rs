//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the RPC and operational handlers
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Serve on a listener until shutdown is signalled
//! - Turn every RPC outcome, including unreadable bodies and calls that outlive
//!   the request timeout, into a JSON-RPC reply
//!
//! # Design Decisions
//! - The RPC route has its own timeout inside the handler; `TimeoutLayer`
//!   would answer an empty 408. Applies run detached, so a call that times
//!   out still finishes its apply (and any rollback) in the background.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ManagerConfig;
use crate::http::request::{request_id, UuidRequestId};
use crate::registry::RegistryStats;
use crate::reload::ApplyStatus;
use crate::rpc::{Dispatcher, RpcError, RpcRequest, RpcResponse};

/// Path of the JSON-RPC endpoint.
pub const RPC_PATH: &str = "/haproxy";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub request_timeout: Duration,
}

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub live: bool,
    pub registry: RegistryStats,
    pub apply: ApplyStatus,
}

/// HTTP front of the manager.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ManagerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let state = AppState {
            dispatcher,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ManagerConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/status", get(status_handler))
            .route_layer(TimeoutLayer::new(state.request_timeout))
            .route(RPC_PATH, post(rpc_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id(request),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The router, for serving elsewhere or driving with `tower::ServiceExt`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// JSON-RPC endpoint. Always answers 200; failures are in the `error` field.
async fn rpc_handler(State(state): State<AppState>, body: Result<Bytes, BytesRejection>) -> Json<RpcResponse> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable RPC body");
            return Json(parse_failure(Value::Null, rejection.body_text()));
        }
    };

    match serde_json::from_slice::<RpcRequest>(&body) {
        Ok(request) => {
            let id = request.id.clone();
            let method = request.method.clone();
            match tokio::time::timeout(state.request_timeout, state.dispatcher.handle(request)).await {
                Ok(response) => Json(response),
                Err(_) => {
                    let secs = state.request_timeout.as_secs();
                    tracing::warn!(method = %method, timeout_secs = secs, "RPC call timed out");
                    Json(RpcResponse {
                        id,
                        result: Value::Null,
                        error: Some(RpcError::TimedOut(secs).to_wire()),
                    })
                }
            }
        }
        Err(e) => {
            let id = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|v| v.get("id").cloned())
                .unwrap_or(Value::Null);
            tracing::warn!(error = %e, "Malformed RPC request");
            Json(parse_failure(id, e.to_string()))
        }
    }
}

fn parse_failure(id: Value, message: String) -> RpcResponse {
    RpcResponse {
        id,
        result: Value::Null,
        error: Some(RpcError::Parse(message).to_wire()),
    }
}

/// 200 while live, 404 otherwise. Axum answers `HEAD` from this `GET` route.
async fn health_handler(State(state): State<AppState>) -> StatusCode {
    if state.dispatcher.live().is_live() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = &state.dispatcher;
    Json(StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        live: dispatcher.live().is_live(),
        registry: dispatcher.registry().stats(),
        apply: dispatcher.controller().status().as_ref().clone(),
    })
}
