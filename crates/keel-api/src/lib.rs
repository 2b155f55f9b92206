//! keel-api — REST API for the Keel control center.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/agents` | Register an edge agent |
//! | GET | `/api/v1/agents` | List agents (liveness recomputed) |
//! | POST | `/api/v1/heartbeat` | Agent heartbeat |
//! | POST | `/api/v1/clusters` | Register a Kubernetes cluster |
//! | GET | `/api/v1/clusters` | List clusters |
//! | POST | `/api/v1/deployments` | Create and dispatch a deployment |
//! | GET | `/api/v1/deployments` | List deployments of one agent or cluster |
//! | GET | `/api/v1/deployments/{id}` | Get one deployment |
//! | GET | `/healthz` | Liveness probe |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! Errors are returned as `{"error": "<message>"}`.

pub mod error;
pub mod handlers;
pub mod prometheus;

use axum::Router;
use axum::routing::{get, post};
use keel_dispatch::Dispatcher;
use keel_state::{AgentRegistry, ClusterRegistry, Ledger};

pub use error::{ApiError, ApiResult, ErrorBody};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub agents: AgentRegistry,
    pub clusters: ClusterRegistry,
    pub ledger: Ledger,
    pub dispatcher: Dispatcher,
}

/// Build the complete API router (REST + health + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/agents", get(handlers::list_agents).post(handlers::register_agent))
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/clusters", get(handlers::list_clusters).post(handlers::register_cluster))
        .route(
            "/deployments",
            get(handlers::list_deployments).post(handlers::create_deployment),
        )
        .route("/deployments/{id}", get(handlers::get_deployment))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
