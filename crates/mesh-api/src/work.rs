//! Balancer front door: accepts client work and relays the worker's result.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::warn;

use mesh_balancer::{BalancerError, LoadBalancer, WorkRequest};

use crate::handlers::error_response;

/// POST /process
pub async fn process(
    State(balancer): State<Arc<LoadBalancer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let work = WorkRequest::new(body, content_type);

    match balancer.route(&work).await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::OK);
            let mut out = (status, resp.body).into_response();
            if let Some(ct) = resp.content_type.and_then(|ct| ct.parse().ok()) {
                out.headers_mut().insert(header::CONTENT_TYPE, ct);
            }
            out
        }
        Err(e @ BalancerError::NoInstances) => {
            warn!(error = %e, "work rejected");
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        Err(e @ BalancerError::AllFailed { .. }) => {
            warn!(error = %e, "work failed on every instance");
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response()
        }
    }
}
