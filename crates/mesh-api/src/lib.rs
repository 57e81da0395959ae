//! mesh-api — HTTP surface of the mesh control plane.
//!
//! Two routers, served on separate listeners by `meshd`:
//!
//! # Control-plane routes ([`build_router`])
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/register` | Upsert a worker (`{id?, address, port}`) |
//! | GET | `/instances` | All worker records |
//! | GET | `/instances/{id}` | One worker record |
//! | GET | `/instances/{id}/history` | Health samples, oldest first |
//! | GET | `/instances/{id}/requests` | Request audit log |
//! | POST | `/instances/{id}/requests` | Append to the audit log |
//! | POST | `/create-instance` | Launch and register a worker |
//! | POST | `/trigger-chaos` | Destroy one random healthy worker |
//! | GET | `/events` | Server-sent status events |
//! | GET | `/events/subscribers` | Current push-channel subscriber count |
//!
//! # Balancer routes ([`balancer_router`])
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/process` | Route one unit of work with failover |

pub mod events;
pub mod handlers;
pub mod work;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use mesh_balancer::LoadBalancer;
use mesh_lifecycle::{ChaosInjector, LifecycleManager};
use mesh_registry::Registry;

/// Shared state for control-plane handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Registry,
    pub lifecycle: Arc<LifecycleManager>,
    pub chaos: Arc<ChaosInjector>,
}

/// Build the control-plane router (REST + push channel).
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/instances", get(handlers::list_instances))
        .route("/instances/{id}", get(handlers::get_instance))
        .route("/instances/{id}/history", get(handlers::get_history))
        .route(
            "/instances/{id}/requests",
            get(handlers::list_requests).post(handlers::log_request),
        )
        .route("/create-instance", post(handlers::create_instance))
        .route("/trigger-chaos", post(handlers::trigger_chaos))
        .route("/events", get(events::stream_events))
        .route("/events/subscribers", get(events::subscriber_count))
        .with_state(state)
}

/// Build the client-facing work router.
pub fn balancer_router(balancer: Arc<LoadBalancer>) -> Router {
    Router::new()
        .route("/process", post(work::process))
        .with_state(balancer)
}
