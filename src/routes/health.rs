//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - Liveness probe (is the process serving?)
//! - /ready, /readyz - Readiness probe (can the credential store be reached?)
//!
//! Liveness never touches the store. Readiness pings it and answers 503 when
//! the ping fails or times out.

use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::warn;

use super::respond::{json_response, BoxBody};
use crate::server::AppState;

/// Probe response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    /// 'online' or 'degraded'
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server state was built
    pub uptime: u64,
    pub timestamp: String,
    /// 'development' or 'production'
    pub mode: &'static str,
    /// Store backend in use (`mongodb` or `memory`)
    pub store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState, store_error: Option<String>) -> HealthResponse {
    HealthResponse {
        healthy: store_error.is_none(),
        status: if store_error.is_none() {
            "online"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        store: state.stores.backend,
        error: store_error,
    }
}

/// Handle liveness probe (/health, /healthz). Always 200 while serving.
pub fn health_check(state: &AppState) -> Response<BoxBody> {
    json_response(StatusCode::OK, &build_health_response(state, None))
}

/// Handle readiness probe (/ready, /readyz)
pub async fn readiness_check(state: &AppState) -> Response<BoxBody> {
    match state.stores.credentials.ping().await {
        Ok(()) => json_response(StatusCode::OK, &build_health_response(state, None)),
        Err(e) => {
            warn!("Readiness ping failed: {}", e);
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &build_health_response(state, Some("credential store unreachable".into())),
            )
        }
    }
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "vidtube",
    };
    json_response(StatusCode::OK, &response)
}
