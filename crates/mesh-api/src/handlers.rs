//! Control-plane REST handlers.
//!
//! Reads return bare JSON (records, arrays); commands return the
//! `{success, data, error}` envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use mesh_lifecycle::LifecycleError;
use mesh_registry::{Registration, RegistryError, RequestLogEntry};

use crate::ApiState;

/// Longest stored payload/outcome summary, in characters.
const SUMMARY_LIMIT: usize = 256;

/// Response wrapper for commands.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn unknown_worker(id: &str) -> axum::response::Response {
    error_response(&format!("instance not found: {id}"), StatusCode::NOT_FOUND).into_response()
}

// ── Registration ───────────────────────────────────────────────

/// Body of `POST /register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub address: String,
    pub port: u16,
}

/// POST /register
pub async fn register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let address = req.address.trim();
    if address.is_empty() {
        return error_response("address must not be empty", StatusCode::BAD_REQUEST).into_response();
    }
    if req.port == 0 {
        return error_response("port must be non-zero", StatusCode::BAD_REQUEST).into_response();
    }

    let id = req
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("{address}:{}", req.port));

    let record = state
        .registry
        .register(Registration::new(id, address, req.port))
        .await;
    ApiResponse::ok(record).into_response()
}

// ── Instances ──────────────────────────────────────────────────

/// GET /instances
pub async fn list_instances(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.registry.list().await)
}

/// GET /instances/:id
pub async fn get_instance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&id).await {
        Some(record) => Json(record).into_response(),
        None => unknown_worker(&id),
    }
}

/// GET /instances/:id/history
pub async fn get_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.history(&id).await {
        Some(samples) => Json(samples).into_response(),
        None => unknown_worker(&id),
    }
}

// ── Request audit ──────────────────────────────────────────────

/// Body of `POST /instances/:id/requests`.
#[derive(Debug, Deserialize)]
pub struct LogRequestBody {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub response: serde_json::Value,
    pub url: String,
}

/// GET /instances/:id/requests
pub async fn list_requests(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.requests(&id).await {
        Some(entries) => Json(entries).into_response(),
        None => unknown_worker(&id),
    }
}

/// POST /instances/:id/requests
pub async fn log_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<LogRequestBody>,
) -> impl IntoResponse {
    let entry = RequestLogEntry {
        kind: body.kind,
        payload_summary: summarize(&body.payload),
        timestamp: Utc::now(),
        outcome: summarize(&body.response),
        target_url: body.url,
    };
    match state.registry.append_request_log(&id, entry.clone()).await {
        Ok(()) => ApiResponse::ok(entry).into_response(),
        Err(RegistryError::NotFound(id)) => unknown_worker(&id),
    }
}

/// Compact, bounded text form of an arbitrary JSON value.
fn summarize(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() <= SUMMARY_LIMIT {
        return text;
    }
    let mut cut: String = text.chars().take(SUMMARY_LIMIT).collect();
    cut.push('…');
    cut
}

// ── Lifecycle ──────────────────────────────────────────────────

/// Body of `POST /create-instance`; an empty body means no suggestion.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    #[serde(default, alias = "suggested_id")]
    pub suggested_id: Option<String>,
}

/// POST /create-instance
pub async fn create_instance(
    State(state): State<ApiState>,
    body: Bytes,
) -> impl IntoResponse {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        CreateInstanceRequest::default()
    } else {
        match serde_json::from_slice::<CreateInstanceRequest>(&body) {
            Ok(req) => req,
            Err(e) => {
                return error_response(&format!("invalid body: {e}"), StatusCode::BAD_REQUEST)
                    .into_response();
            }
        }
    };
    match state.lifecycle.create_worker(req.suggested_id).await {
        Ok(record) => ApiResponse::ok(record).into_response(),
        Err(e @ LifecycleError::IdInUse(_)) => {
            warn!(error = %e, "create-instance rejected");
            error_response(&e.to_string(), StatusCode::CONFLICT).into_response()
        }
        Err(e) => {
            error!(error = %e, "create-instance failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

// ── Chaos ──────────────────────────────────────────────────────

/// Payload of a successful `POST /trigger-chaos`.
#[derive(Debug, Serialize)]
pub struct ChaosReport {
    pub message: String,
    #[serde(flatten)]
    pub outcome: mesh_lifecycle::ChaosOutcome,
}

/// POST /trigger-chaos
pub async fn trigger_chaos(State(state): State<ApiState>) -> impl IntoResponse {
    match state.chaos.inject_failure().await {
        Ok(outcome) => ApiResponse::ok(ChaosReport {
            message: outcome.describe(),
            outcome,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "chaos injection failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}
