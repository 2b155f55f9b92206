//! Client against a live API server on a loopback port.

use std::sync::Arc;
use std::time::Duration;

use keel_api::{ApiState, build_router};
use keel_client::{ClientError, ControlCenterClient};
use keel_dispatch::{AgentExecutor, DispatchConfig, Dispatcher, KubeExecutor, TargetExecutor};
use keel_state::*;
use reqwest::StatusCode;

async fn serve() -> (ControlCenterClient, ApiState) {
    let agents = AgentRegistry::default();
    let ledger = Ledger::default();
    let executor = TargetExecutor::new(AgentExecutor::new(agents.clone()), KubeExecutor::default());
    let state = ApiState {
        agents,
        clusters: ClusterRegistry::default(),
        ledger: ledger.clone(),
        dispatcher: Dispatcher::new(Arc::new(executor), ledger, DispatchConfig::default()),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = ControlCenterClient::new(&format!("http://{addr}/")).unwrap();
    (client, state)
}

#[tokio::test]
async fn agent_lifecycle() {
    let (client, state) = serve().await;

    let agent = client.register_agent("agent-instance-1:9090").await.unwrap();
    assert_eq!(agent.address, "agent-instance-1:9090");
    client.heartbeat(&agent.id).await.unwrap();

    let agents = client.list_agents().await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].status, Liveness::Online);

    let dep = client
        .create_deployment(Owner::Agent(agent.id.clone()), "nginx:latest")
        .await
        .unwrap();
    assert_eq!(dep.status, DeploymentStatus::Pending);

    assert!(state.dispatcher.drain(Duration::from_secs(5)).await);

    let listed = client.list_deployments(Owner::Agent(agent.id)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, dep.id);
    assert_eq!(listed[0].status, DeploymentStatus::Running);

    let fetched = client.get_deployment(&dep.id).await.unwrap();
    assert_eq!(fetched.image_url, "nginx:latest");
}

#[tokio::test]
async fn server_errors_surface_message() {
    let (client, _) = serve().await;

    let err = client.heartbeat("ghost").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    match err {
        ClientError::Api { message, .. } => assert_eq!(message, "Agent not found"),
        other => panic!("unexpected error: {other}"),
    }

    let err = client
        .create_deployment(Owner::Cluster("missing".to_string()), "nginx")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "control center returned 404 Not Found: Cluster not found");
}

#[tokio::test]
async fn bad_kubeconfig_fails_deployment() {
    let (client, state) = serve().await;

    let cluster = client.register_cluster("prod", "not-base64!").await.unwrap();
    assert_eq!(client.list_clusters().await.unwrap(), vec![cluster.clone()]);

    let dep = client
        .create_deployment(Owner::Cluster(cluster.id), "nginx")
        .await
        .unwrap();
    assert!(state.dispatcher.drain(Duration::from_secs(5)).await);

    let fetched = client.get_deployment(&dep.id).await.unwrap();
    assert_eq!(fetched.status, DeploymentStatus::Failed);
    assert!(fetched.error.unwrap().starts_with("failed to decode kubeconfig"));
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ControlCenterClient::new(&format!("http://{addr}")).unwrap();
    let err = client.list_agents().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}
