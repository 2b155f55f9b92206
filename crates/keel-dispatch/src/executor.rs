//! Executors realize a deployment on its target.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use keel_state::{Agent, AgentRegistry, Cluster, Deployment, TargetKind};

use crate::error::{ExecuteError, ExecuteResult};
use crate::kube::KubeExecutor;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A resolved target, captured when the deployment is created.
#[derive(Debug, Clone)]
pub enum DispatchTarget {
    Agent(Agent),
    Cluster(Cluster),
}

impl DispatchTarget {
    pub fn id(&self) -> &str {
        match self {
            DispatchTarget::Agent(agent) => &agent.id,
            DispatchTarget::Cluster(cluster) => &cluster.id,
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            DispatchTarget::Agent(_) => TargetKind::Agent,
            DispatchTarget::Cluster(_) => TargetKind::Cluster,
        }
    }
}

/// Performs the remote side of a deployment.
///
/// Implementations must not touch the ledger; the dispatcher records
/// the outcome.
pub trait Executor: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        target: &'a DispatchTarget,
        deployment: &'a Deployment,
    ) -> BoxFuture<'a, ExecuteResult<()>>;
}

// ── Agents ─────────────────────────────────────────────────────────

/// Hands a deployment to an edge agent.
///
/// Agents pull their work by polling the deployments endpoint, so there
/// is nothing to push: execution succeeds when the agent is live and
/// will therefore pick the deployment up on its next poll.
#[derive(Clone)]
pub struct AgentExecutor {
    agents: AgentRegistry,
}

impl AgentExecutor {
    pub fn new(agents: AgentRegistry) -> Self {
        Self { agents }
    }

    pub fn hand_off(&self, agent_id: &str, deployment: &Deployment) -> ExecuteResult<()> {
        match self.agents.is_live(agent_id) {
            Some(true) => {
                debug!(%agent_id, deployment_id = %deployment.id, "deployment queued for agent poll");
                Ok(())
            }
            Some(false) => Err(ExecuteError::AgentOffline(agent_id.to_string())),
            None => Err(ExecuteError::AgentUnknown(agent_id.to_string())),
        }
    }
}

impl Executor for AgentExecutor {
    fn execute<'a>(
        &'a self,
        target: &'a DispatchTarget,
        deployment: &'a Deployment,
    ) -> BoxFuture<'a, ExecuteResult<()>> {
        Box::pin(async move {
            match target {
                DispatchTarget::Agent(agent) => self.hand_off(&agent.id, deployment),
                other => Err(ExecuteError::Unsupported {
                    executor: "agent",
                    kind: other.kind(),
                }),
            }
        })
    }
}

// ── Routing ────────────────────────────────────────────────────────

/// Routes each target kind to its executor.
#[derive(Clone)]
pub struct TargetExecutor {
    agents: AgentExecutor,
    clusters: KubeExecutor,
}

impl TargetExecutor {
    pub fn new(agents: AgentExecutor, clusters: KubeExecutor) -> Self {
        Self { agents, clusters }
    }
}

impl Executor for TargetExecutor {
    fn execute<'a>(
        &'a self,
        target: &'a DispatchTarget,
        deployment: &'a Deployment,
    ) -> BoxFuture<'a, ExecuteResult<()>> {
        match target {
            DispatchTarget::Agent(_) => self.agents.execute(target, deployment),
            DispatchTarget::Cluster(_) => self.clusters.execute(target, deployment),
        }
    }
}
