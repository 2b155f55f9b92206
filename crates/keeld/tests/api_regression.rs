//! API regression tests.
//!
//! Drives the fully assembled control center through its router with a
//! manual clock, covering registration, liveness, heartbeats and the
//! deployment lifecycle.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower::ServiceExt;

use keel_api::{ApiState, build_router};
use keel_state::ManualClock;
use keeld::{DaemonConfig, build_state};

struct Harness {
    clock: ManualClock,
    state: ApiState,
    router: Router,
}

fn harness() -> Harness {
    let clock = ManualClock::default();
    let state = build_state(&DaemonConfig::default(), Arc::new(clock.clone()));
    let router = build_router(state.clone());
    Harness {
        clock,
        state,
        router,
    }
}

impl Harness {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(req).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_raw(uri, body.to_string()).await
    }

    async fn post_raw(&self, uri: &str, body: String) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    async fn settle(&self) {
        assert!(self.state.dispatcher.drain(Duration::from_secs(10)).await);
    }
}

fn is_uuid(s: &str) -> bool {
    let parts: Vec<_> = s.split('-').collect();
    parts.iter().map(|p| p.len()).collect::<Vec<_>>() == [8, 4, 4, 4, 12]
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit()))
}

// ── Agents & liveness ──────────────────────────────────────────

#[tokio::test]
async fn agent_goes_offline_after_46_silent_seconds() {
    let h = harness();

    let (status, agent) = h.post("/api/v1/agents", json!({"address": "agent-1:9090"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = agent["id"].as_str().unwrap().to_string();
    assert!(is_uuid(&id), "not a uuid: {id}");

    let (status, list) = h.get("/api/v1/agents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["status"], "online");

    h.clock.advance(Duration::from_secs(46));

    let (_, list) = h.get("/api/v1/agents").await;
    assert_eq!(list[0]["id"], id.as_str());
    assert_eq!(list[0]["status"], "offline");
}

#[tokio::test]
async fn heartbeat_revives_agent() {
    let h = harness();
    let (_, agent) = h.post("/api/v1/agents", json!({"address": "agent-1:9090"})).await;
    let id = agent["id"].clone();

    h.clock.advance(Duration::from_secs(120));
    let (_, list) = h.get("/api/v1/agents").await;
    assert_eq!(list[0]["status"], "offline");

    let (status, _) = h.post("/api/v1/heartbeat", json!({ "id": id })).await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = h.get("/api/v1/agents").await;
    assert_eq!(list[0]["status"], "online");

    // Exactly the window later is still online.
    h.clock.advance(Duration::from_secs(45));
    let (_, list) = h.get("/api/v1/agents").await;
    assert_eq!(list[0]["status"], "online");
}

#[tokio::test]
async fn heartbeat_errors() {
    let h = harness();

    let (status, body) = h.post("/api/v1/heartbeat", json!({"id": "never-registered"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Agent not found");

    let (status, _) = h.post_raw("/api/v1/heartbeat", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.post("/api/v1/heartbeat", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_agent_registration_changes_nothing() {
    let h = harness();

    let (status, body) = h.post_raw("/api/v1/agents", "address=x".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");

    let (status, _) = h.post("/api/v1/agents", json!({"address": 42})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = h.get("/api/v1/agents").await;
    assert_eq!(list, json!([]));
}

// ── Deployments ────────────────────────────────────────────────

#[tokio::test]
async fn agent_deployment_round_trips_through_listing() {
    let h = harness();
    let (_, agent) = h.post("/api/v1/agents", json!({"address": "agent-1:9090"})).await;
    let agent_id = agent["id"].as_str().unwrap().to_string();

    let (status, dep) = h
        .post(
            "/api/v1/deployments",
            json!({"agent_id": agent_id, "image_url": "nginx:latest"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dep["status"], "pending");
    assert_eq!(dep["agent_id"], agent_id.as_str());
    let dep_id = dep["id"].as_str().unwrap();
    assert!(dep_id.starts_with("dep-") && dep_id.len() == 12);

    h.settle().await;

    let (status, list) = h.get(&format!("/api/v1/deployments?agent_id={agent_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], dep["id"]);
    assert_eq!(list[0]["image_url"], dep["image_url"]);
    assert_eq!(list[0]["created_at"], dep["created_at"]);
    assert_eq!(list[0]["status"], "running");

    let (status, fetched) = h.get(&format!("/api/v1/deployments/{dep_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], dep["id"]);
}

#[tokio::test]
async fn deployment_to_offline_agent_fails() {
    let h = harness();
    let (_, agent) = h.post("/api/v1/agents", json!({"address": "agent-1:9090"})).await;
    let agent_id = agent["id"].as_str().unwrap().to_string();
    h.clock.advance(Duration::from_secs(300));

    let (status, dep) = h
        .post("/api/v1/deployments", json!({"agent_id": agent_id, "image_url": "nginx"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    h.settle().await;

    let (_, fetched) = h.get(&format!("/api/v1/deployments/{}", dep["id"].as_str().unwrap())).await;
    assert_eq!(fetched["status"], "failed");
    assert!(fetched["error"].as_str().unwrap().contains("offline"));
}

#[tokio::test]
async fn cluster_deployment_with_bad_kubeconfig_is_failed_not_rejected() {
    let h = harness();

    let (status, cluster) = h
        .post(
            "/api/v1/clusters",
            json!({"name": "edge", "kubeconfig": STANDARD.encode("not: [valid")}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let cluster_id = cluster["id"].as_str().unwrap().to_string();

    let (status, dep) = h
        .post(
            "/api/v1/deployments",
            json!({"cluster_id": cluster_id, "image_url": "nginx"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dep["status"], "pending");

    h.settle().await;

    let (_, list) = h.get(&format!("/api/v1/deployments?cluster_id={cluster_id}")).await;
    assert_eq!(list[0]["status"], "failed");
    assert!(list[0]["error"].as_str().unwrap().starts_with("invalid kubeconfig"));
}

#[tokio::test]
async fn deployment_validation() {
    let h = harness();

    let (status, body) = h
        .post("/api/v1/deployments", json!({"cluster_id": "nope", "image_url": "nginx"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Cluster not found");

    let (status, body) = h
        .post("/api/v1/deployments", json!({"agent_id": "nope", "image_url": "nginx"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Agent not found");

    let (status, body) = h.post("/api/v1/deployments", json!({"cluster_id": "c-1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cluster_id and image_url are required");

    let (status, _) = h
        .post(
            "/api/v1/deployments",
            json!({"agent_id": "a", "cluster_id": "c", "image_url": "nginx"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.get("/api/v1/deployments").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.get("/api/v1/deployments/dep-ffffffff").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(h.state.ledger.is_empty());
}

#[tokio::test]
async fn deployments_are_partitioned_by_owner() {
    let h = harness();
    let (_, a1) = h.post("/api/v1/agents", json!({"address": "a1:9090"})).await;
    let (_, a2) = h.post("/api/v1/agents", json!({"address": "a2:9090"})).await;
    let a1 = a1["id"].as_str().unwrap().to_string();
    let a2 = a2["id"].as_str().unwrap().to_string();

    for (owner, image) in [(&a1, "img:1"), (&a2, "img:2"), (&a1, "img:3")] {
        let (status, _) = h
            .post("/api/v1/deployments", json!({"agent_id": owner, "image_url": image}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, list) = h.get(&format!("/api/v1/deployments?agent_id={a1}")).await;
    let images: Vec<_> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["image_url"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(images, ["img:1", "img:3"]);

    let (_, list) = h.get(&format!("/api/v1/deployments?agent_id={a2}")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (_, list) = h.get("/api/v1/deployments?agent_id=unknown").await;
    assert_eq!(list, json!([]));
}

// ── Operations ─────────────────────────────────────────────────

#[tokio::test]
async fn healthz_and_metrics() {
    let h = harness();
    h.post("/api/v1/agents", json!({"address": "a1:9090"})).await;

    let (status, body) = h.get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));

    let (status, body) = h.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("keel_agents{status=\"online\"} 1"));
    assert!(text.contains("keel_clusters 0"));
}

#[tokio::test]
async fn serve_stops_on_shutdown_signal() {
    let config = DaemonConfig::default();
    let state = build_state(&config, Arc::new(ManualClock::default()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(keeld::serve(listener, state, config.shutdown_grace(), async {
        let _ = rx.await;
    }));
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}
