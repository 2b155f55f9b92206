//! REST API handlers.
//!
//! Handlers validate input, touch the registry or ledger, and return
//! JSON. Request bodies are taken as `Result<Json<_>, JsonRejection>` so
//! every malformed body becomes a uniform 400.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::info;

use keel_dispatch::DispatchTarget;
use keel_state::*;

use crate::ApiState;
use crate::error::{ApiError, ApiResult, not_found_message};

// ── Agents ─────────────────────────────────────────────────────

/// POST /api/v1/agents
pub async fn register_agent(
    State(state): State<ApiState>,
    body: Result<Json<AgentRegistration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let Json(req) = body?;
    req.validate()?;
    let agent = state.agents.register(req.address);
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/v1/agents
pub async fn list_agents(State(state): State<ApiState>) -> Json<Vec<Agent>> {
    Json(state.agents.list())
}

/// POST /api/v1/heartbeat
pub async fn heartbeat(
    State(state): State<ApiState>,
    body: Result<Json<Heartbeat>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    req.validate()?;
    if !state.agents.heartbeat(&req.id) {
        return Err(ApiError::NotFound(not_found_message(TargetKind::Agent).to_string()));
    }
    Ok(Json(json!({ "status": "ok" })))
}

// ── Clusters ───────────────────────────────────────────────────

/// POST /api/v1/clusters
pub async fn register_cluster(
    State(state): State<ApiState>,
    body: Result<Json<ClusterRegistration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Cluster>)> {
    let Json(req) = body?;
    req.validate()?;
    let cluster = state.clusters.register(req.name, req.kubeconfig);
    Ok((StatusCode::CREATED, Json(cluster)))
}

/// GET /api/v1/clusters
pub async fn list_clusters(State(state): State<ApiState>) -> Json<Vec<Cluster>> {
    Json(state.clusters.list())
}

// ── Deployments ────────────────────────────────────────────────

/// POST /api/v1/deployments
///
/// The target is resolved before anything is recorded, so an unknown
/// target leaves no trace in the ledger. The response is sent while
/// the deployment is still `pending`.
pub async fn create_deployment(
    State(state): State<ApiState>,
    body: Result<Json<DeploymentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    let Json(req) = body?;
    let owner = req.owner()?;

    let target = match &owner {
        Owner::Agent(id) => DispatchTarget::Agent(state.agents.require(id)?),
        Owner::Cluster(id) => DispatchTarget::Cluster(state.clusters.require(id)?),
    };

    let deployment = state.ledger.create(owner, req.image_url);
    info!(
        deployment_id = %deployment.id,
        target = %target.kind(),
        target_id = %target.id(),
        "dispatching deployment"
    );
    // Outcome is written to the ledger by the dispatcher.
    drop(state.dispatcher.dispatch(target, deployment.clone()));

    Ok((StatusCode::CREATED, Json(deployment)))
}

/// GET /api/v1/deployments?agent_id=… | ?cluster_id=…
pub async fn list_deployments(
    State(state): State<ApiState>,
    query: Result<Query<DeploymentQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Deployment>>> {
    let Query(query) = query?;
    let owner = query.owner()?;
    Ok(Json(state.ledger.list_for_owner(&owner)))
}

/// GET /api/v1/deployments/{id}
pub async fn get_deployment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deployment>> {
    state
        .ledger
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Deployment not found".to_string()))
}

// ── Operations ─────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = crate::prometheus::render_prometheus(&crate::prometheus::Gauges::collect(&state));
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
