//! Edge agent: client-side participation in a Keel fleet.
//!
//! The agent registers once, then runs two loops until shutdown:
//! heartbeats keep it `online` in the control center, and polling
//! discovers deployments addressed to it. Each deployment id is handled
//! at most once per agent process, and deployments the control center
//! already marked `failed` are never handled.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use keel_client::{ClientResult, ControlCenterClient};
use keel_state::{Deployment, DeploymentStatus, Owner};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Control-center base URL.
    pub control_center: String,
    /// Address advertised at registration.
    pub address: String,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    /// Client timeout for each poll request.
    pub poll_timeout: Duration,
}

impl AgentConfig {
    pub fn new(control_center: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            control_center: control_center.into(),
            address: address.into(),
            heartbeat_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(5),
        }
    }
}

pub struct EdgeAgent {
    config: AgentConfig,
    client: ControlCenterClient,
    poll_client: ControlCenterClient,
    agent_id: Option<String>,
}

impl EdgeAgent {
    pub fn new(config: AgentConfig) -> anyhow::Result<Self> {
        let client = ControlCenterClient::new(&config.control_center)?;
        let poll_client =
            ControlCenterClient::with_timeout(&config.control_center, config.poll_timeout)?;
        Ok(Self {
            config,
            client,
            poll_client,
            agent_id: None,
        })
    }

    /// Register with the control center and remember the assigned id.
    pub async fn register(&mut self) -> anyhow::Result<String> {
        let agent = self.client.register_agent(&self.config.address).await?;
        info!(agent_id = %agent.id, address = %agent.address, "registered with control center");
        self.agent_id = Some(agent.id.clone());
        Ok(agent.id)
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    fn require_id(&self) -> anyhow::Result<&str> {
        self.agent_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("not registered, call register() first"))
    }

    /// Send heartbeats every `heartbeat_interval` until shutdown.
    /// A failed heartbeat is logged and retried on the next tick.
    pub async fn run_heartbeat(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let agent_id = self.require_id()?;
        info!(%agent_id, interval = ?self.config.heartbeat_interval, "heartbeat loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {
                    match self.client.heartbeat(agent_id).await {
                        Ok(()) => debug!(%agent_id, "heartbeat sent"),
                        Err(e) => warn!(%agent_id, error = %e, "heartbeat failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!(%agent_id, "heartbeat loop shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Poll for deployments every `poll_interval` until shutdown.
    pub async fn run_poll(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let agent_id = self.require_id()?;
        info!(%agent_id, interval = ?self.config.poll_interval, "poll loop started");

        let mut processed = HashSet::new();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.poll_once(&mut processed).await {
                        warn!(%agent_id, error = %e, "polling for deployments failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!(%agent_id, "poll loop shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Fetch this agent's deployments and handle the ones not seen
    /// before, skipping failed ones. Returns the newly handled deployments.
    pub async fn poll_once(&self, processed: &mut HashSet<String>) -> anyhow::Result<Vec<Deployment>> {
        let agent_id = self.require_id()?;
        debug!(%agent_id, "polling for deployments");

        let deployments = self.fetch(agent_id).await?;
        let mut handled = Vec::new();
        for deployment in deployments {
            if !processed.insert(deployment.id.clone()) {
                continue;
            }
            if deployment.status == DeploymentStatus::Failed {
                debug!(
                    deployment_id = %deployment.id,
                    error = deployment.error.as_deref().unwrap_or_default(),
                    "skipping failed deployment"
                );
                continue;
            }
            info!(
                deployment_id = %deployment.id,
                image = %deployment.image_url,
                "found new deployment"
            );
            handle_deployment(&deployment);
            handled.push(deployment);
        }
        Ok(handled)
    }

    async fn fetch(&self, agent_id: &str) -> ClientResult<Vec<Deployment>> {
        self.poll_client
            .list_deployments(Owner::Agent(agent_id.to_string()))
            .await
    }
}

/// Simulated image pull.
fn handle_deployment(deployment: &Deployment) {
    info!(deployment_id = %deployment.id, image = %deployment.image_url, "pulling image");
    info!(deployment_id = %deployment.id, "deployment handled (simulated)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use keel_api::{ApiState, build_router};
    use keel_dispatch::{
        AgentExecutor, DispatchConfig, DispatchTarget, Dispatcher, KubeExecutor, TargetExecutor,
    };
    use keel_state::{
        AgentRegistry, Clock, ClusterRegistry, Ledger, Liveness, ManualClock, SystemClock,
    };

    async fn control_center() -> (String, ApiState) {
        control_center_with_clock(Arc::new(SystemClock)).await
    }

    async fn control_center_with_clock(clock: Arc<dyn Clock>) -> (String, ApiState) {
        let agents = AgentRegistry::new(clock.clone());
        let ledger = Ledger::new(clock.clone());
        let executor =
            TargetExecutor::new(AgentExecutor::new(agents.clone()), KubeExecutor::default());
        let state = ApiState {
            agents,
            clusters: ClusterRegistry::new(clock),
            ledger: ledger.clone(),
            dispatcher: Dispatcher::new(Arc::new(executor), ledger, DispatchConfig::default()),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), state)
    }

    #[test]
    fn default_intervals() {
        let config = AgentConfig::new("http://localhost:8080", "agent-instance-1:9090");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.poll_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn loops_require_registration() {
        let agent = EdgeAgent::new(AgentConfig::new("http://127.0.0.1:1", "a:1")).unwrap();
        assert!(agent.agent_id().is_none());
        let (_tx, rx) = watch::channel(false);
        assert!(agent.run_heartbeat(rx).await.is_err());
    }

    #[tokio::test]
    async fn register_and_poll_handles_each_deployment_once() {
        let (url, state) = control_center().await;
        let mut agent = EdgeAgent::new(AgentConfig::new(&url, "agent-instance-1:9090")).unwrap();
        let id = agent.register().await.unwrap();
        assert_eq!(state.agents.get(&id).unwrap().address, "agent-instance-1:9090");

        let first = state.ledger.create(Owner::Agent(id.clone()), "nginx:1");
        let mut processed = HashSet::new();

        let handled = agent.poll_once(&mut processed).await.unwrap();
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].id, first.id);

        // Nothing new on the next poll.
        assert!(agent.poll_once(&mut processed).await.unwrap().is_empty());

        let second = state.ledger.create(Owner::Agent(id), "nginx:2");
        let handled = agent.poll_once(&mut processed).await.unwrap();
        assert_eq!(handled.iter().map(|d| &d.id).collect::<Vec<_>>(), [&second.id]);
    }

    #[tokio::test]
    async fn deployment_failed_while_offline_is_not_pulled_after_reconnect() {
        let clock = ManualClock::default();
        let (url, state) = control_center_with_clock(Arc::new(clock.clone())).await;
        let mut agent = EdgeAgent::new(AgentConfig::new(&url, "agent-1:9090")).unwrap();
        let id = agent.register().await.unwrap();

        clock.advance(Duration::from_secs(120));
        let offline = state.ledger.create(Owner::Agent(id.clone()), "nginx:1");
        let target = DispatchTarget::Agent(state.agents.get(&id).unwrap());
        state.dispatcher.dispatch(target, offline.clone()).await.unwrap();
        assert_eq!(state.ledger.get(&offline.id).unwrap().status, DeploymentStatus::Failed);

        assert!(state.agents.heartbeat(&id));
        let mut processed = HashSet::new();
        assert!(agent.poll_once(&mut processed).await.unwrap().is_empty());
        assert!(processed.contains(&offline.id));

        // Work dispatched after reconnecting is still handled.
        let online = state.ledger.create(Owner::Agent(id.clone()), "nginx:2");
        let target = DispatchTarget::Agent(state.agents.get(&id).unwrap());
        state.dispatcher.dispatch(target, online.clone()).await.unwrap();
        assert_eq!(state.ledger.get(&online.id).unwrap().status, DeploymentStatus::Running);

        let handled = agent.poll_once(&mut processed).await.unwrap();
        assert_eq!(handled.iter().map(|d| &d.id).collect::<Vec<_>>(), [&online.id]);
    }

    #[tokio::test]
    async fn heartbeat_loop_runs_until_shutdown() {
        let (url, state) = control_center().await;
        let mut config = AgentConfig::new(&url, "agent-1:9090");
        config.heartbeat_interval = Duration::from_millis(10);

        let mut agent = EdgeAgent::new(config).unwrap();
        let id = agent.register().await.unwrap();
        let registered_at = state.agents.get(&id).unwrap().last_seen;

        let (tx, rx) = watch::channel(false);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(agent.run_heartbeat(rx), stop);
        result.unwrap();

        let agent_record = state.agents.get(&id).unwrap();
        assert!(agent_record.last_seen > registered_at);
        assert_eq!(agent_record.status, Liveness::Online);
    }
}
