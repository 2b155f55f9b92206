//! Control-center assembly and serving.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use keel_api::{ApiState, build_router};
use keel_dispatch::{AgentExecutor, Dispatcher, KubeExecutor, TargetExecutor};
use keel_state::{AgentRegistry, Clock, ClusterRegistry, Ledger, Registry};

use crate::config::DaemonConfig;

/// Wire registries, ledger and dispatcher together.
pub fn build_state(config: &DaemonConfig, clock: Arc<dyn Clock>) -> ApiState {
    let agents: AgentRegistry =
        Registry::new(clock.clone()).with_liveness_window(config.liveness_window());
    let clusters: ClusterRegistry = Registry::new(clock.clone());
    let ledger = Ledger::new(clock);

    let executor = TargetExecutor::new(
        AgentExecutor::new(agents.clone()),
        KubeExecutor::new(config.kube_request_timeout()),
    );
    let dispatcher = Dispatcher::new(Arc::new(executor), ledger.clone(), config.dispatch_config());

    ApiState {
        agents,
        clusters,
        ledger,
        dispatcher,
    }
}

/// Serve the API on `listener` until `shutdown` resolves, then let
/// in-flight dispatches finish within `grace`.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    grace: Duration,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let dispatcher = state.dispatcher.clone();
    let router = build_router(state);

    info!(addr = %listener.local_addr()?, "API server starting");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped, draining dispatches");
    if !dispatcher.drain(grace).await {
        warn!(
            in_flight = dispatcher.stats().in_flight,
            "abandoning unfinished dispatches"
        );
        dispatcher.close();
    }
    Ok(())
}
