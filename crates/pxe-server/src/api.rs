//! HTTP API.
//!
//! JSON endpoints over the catalog, the registry and the orchestrator.
//! Every route except `/health` requires the `x-api-key` header when an API
//! key is configured.

use crate::deploy::Orchestrator;
use crate::error::{DeployError, HostPowerError};
use crate::refresh::RefreshEngine;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, put},
};
use models::{
    Bootloader, Configuration, DeploymentRequest, FailureReason, Host, HostRequest, Outcome,
};
use power_client::PowerError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state of the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Orchestrator,
    pub refresh: RefreshEngine,
    /// Required in [`API_KEY_HEADER`] when set; `/health` is always open
    pub api_key: Option<Arc<str>>,
}

/// Builds the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/bootloaders", get(list_bootloaders))
        .route("/v1/configurations", get(list_configurations))
        .route("/v1/configurations/{name}", get(get_configuration))
        .route("/v1/configurations/{name}/deploy", put(deploy))
        .route("/v1/hosts", get(list_hosts))
        .route("/v1/hosts/{name}/reboot", patch(reboot_host))
        .route("/v1/hosts/{name}/on", patch(power_on_host))
        .route("/v1/hosts/{name}/off", patch(power_off_host))
        .route("/v1/refresh", patch(refresh))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn require_api_key(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !ok {
        warn!(path = %req.uri().path(), "Rejected request without a valid API key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

/// Error body: `{"error": "...", "reason": "..."}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<FailureReason>,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Deploy(DeployError),
    HostPower(HostPowerError),
}

impl From<DeployError> for ApiError {
    fn from(e: DeployError) -> Self {
        Self::Deploy(e)
    }
}

impl From<HostPowerError> for ApiError {
    fn from(e: HostPowerError) -> Self {
        Self::HostPower(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::NotFound(error) => (StatusCode::NOT_FOUND, ErrorBody { error, reason: None }),
            Self::Deploy(e) => {
                let status = match e {
                    DeployError::ConfigurationNotFound(_) => StatusCode::NOT_FOUND,
                    DeployError::BootloaderMissing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, ErrorBody { error: e.to_string(), reason: None })
            }
            Self::HostPower(e) => {
                let status = match &e {
                    HostPowerError::HostUnknown(_) => StatusCode::NOT_FOUND,
                    HostPowerError::Power(PowerError::NoManagementEndpoint) => StatusCode::CONFLICT,
                    HostPowerError::Power(PowerError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
                    HostPowerError::Power(_) => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    ErrorBody {
                        error: e.to_string(),
                        reason: Some(e.reason()),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn list_bootloaders(State(state): State<ApiState>) -> Json<Vec<Bootloader>> {
    let catalog = state.orchestrator.catalog().snapshot();
    Json(catalog.bootloaders().cloned().collect())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationView {
    pub name: String,
    pub bootloader: Bootloader,
}

async fn list_configurations(State(state): State<ApiState>) -> Json<Vec<ConfigurationView>> {
    let catalog = state.orchestrator.catalog().snapshot();
    let views = catalog
        .configurations()
        .filter_map(|c| {
            catalog.bootloader(&c.bootloader).map(|b| ConfigurationView {
                name: c.name.clone(),
                bootloader: b.clone(),
            })
        })
        .collect();
    Json(views)
}

async fn get_configuration(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<Configuration>, ApiError> {
    state
        .orchestrator
        .catalog()
        .snapshot()
        .resolve(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Configuration not found: {name}")))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeployBody {
    pub hosts: Vec<HostRequest>,
}

/// Reboot column of a deployment response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rebooted {
    Yes,
    No,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeployedHost {
    pub name: String,
    pub configuration: String,
    pub rebooted: Rebooted,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    pub hosts: Vec<DeployedHost>,
}

async fn deploy(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(body): Json<DeployBody>,
) -> Result<Json<DeployResponse>, ApiError> {
    let result = state
        .orchestrator
        .deploy(DeploymentRequest {
            configuration: name,
            hosts: body.hosts,
        })
        .await?;

    let hosts = result
        .hosts
        .into_iter()
        .map(|h| {
            let (rebooted, reason) = match h.outcome {
                Outcome::Rebooted => (Rebooted::Yes, None),
                Outcome::ConfigApplied => (Rebooted::No, None),
                Outcome::Failed(reason) => (Rebooted::Error, Some(reason)),
            };
            DeployedHost {
                name: h.name,
                configuration: result.configuration.clone(),
                rebooted,
                reason,
            }
        })
        .collect();
    Ok(Json(DeployResponse { hosts }))
}

async fn list_hosts(State(state): State<ApiState>) -> Json<Vec<Host>> {
    Json(state.orchestrator.registry().list().await)
}

async fn reboot_host(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.reboot(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn power_on_host(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.power_on(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn power_off_host(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.power_off(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh(State(state): State<ApiState>) -> StatusCode {
    let report = state.refresh.refresh_all().await;
    if !report.failed.is_empty() {
        info!(failed = ?report.failed, "Refresh finished with failures");
    }
    StatusCode::NO_CONTENT
}
