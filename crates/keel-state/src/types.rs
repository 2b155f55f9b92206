//! Domain types for the Keel control center.
//!
//! These types are the records held by the registry and the ledger and
//! are also the JSON bodies served by the REST API, so field names
//! follow the wire format (`agent_id`, `image_url`, `created_at`, ...).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Identifier of a registered target (UUID v4 string).
pub type TargetId = String;

/// Identifier of a deployment (`dep-` + 8 hex chars).
pub type DeploymentId = String;

// ── Targets ────────────────────────────────────────────────────────

/// The two kinds of deployment destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Agent,
    Cluster,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Agent => f.write_str("agent"),
            TargetKind::Cluster => f.write_str("cluster"),
        }
    }
}

/// Heartbeat-derived liveness of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Online,
    Offline,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Online => f.write_str("online"),
            Liveness::Offline => f.write_str("offline"),
        }
    }
}

/// An edge agent that polls the control center for work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: TargetId,
    /// Advertised network address of the agent (`host:port`).
    pub address: String,
    /// Time of registration or of the latest heartbeat.
    pub last_seen: DateTime<Utc>,
    /// Status as of the last time it was computed.
    pub status: Liveness,
}

impl Agent {
    /// Liveness at `now`: offline once more than `window` has elapsed
    /// since `last_seen`. Exactly `window` is still online.
    pub fn liveness_at(&self, now: DateTime<Utc>, window: Duration) -> Liveness {
        match (now - self.last_seen).to_std() {
            Ok(elapsed) if elapsed > window => Liveness::Offline,
            // A negative delta (clock moved backwards) counts as fresh.
            _ => Liveness::Online,
        }
    }
}

/// A Kubernetes cluster reachable through a kubeconfig.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: TargetId,
    pub name: String,
    /// Base64-encoded kubeconfig document.
    pub kubeconfig: String,
}

// ── Registration requests ──────────────────────────────────────────

/// Body of `POST /api/v1/agents`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRegistration {
    #[serde(default)]
    pub address: String,
}

impl AgentRegistration {
    pub fn validate(&self) -> StateResult<()> {
        if self.address.trim().is_empty() {
            return Err(StateError::Invalid("address is required"));
        }
        Ok(())
    }
}

/// Body of `POST /api/v1/clusters`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterRegistration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kubeconfig: String,
}

impl ClusterRegistration {
    /// Both fields must be present. The kubeconfig is not decoded here;
    /// a bad blob surfaces as a dispatch failure.
    pub fn validate(&self) -> StateResult<()> {
        if self.name.trim().is_empty() || self.kubeconfig.trim().is_empty() {
            return Err(StateError::Invalid("Name and kubeconfig are required"));
        }
        Ok(())
    }
}

/// Body of `POST /api/v1/heartbeat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(default)]
    pub id: TargetId,
}

impl Heartbeat {
    pub fn validate(&self) -> StateResult<()> {
        if self.id.trim().is_empty() {
            return Err(StateError::Invalid("id is required"));
        }
        Ok(())
    }
}

// ── Deployments ────────────────────────────────────────────────────

/// The target that owns a deployment.
///
/// Serialized as a single `agent_id` or `cluster_id` field when
/// flattened into a [`Deployment`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    #[serde(rename = "agent_id")]
    Agent(TargetId),
    #[serde(rename = "cluster_id")]
    Cluster(TargetId),
}

impl Owner {
    pub fn kind(&self) -> TargetKind {
        match self {
            Owner::Agent(_) => TargetKind::Agent,
            Owner::Cluster(_) => TargetKind::Cluster,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Owner::Agent(id) | Owner::Cluster(id) => id,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.id())
    }
}

/// Lifecycle of a deployment.
///
/// The ledger only ever produces `Pending`; `Running` and `Failed` are
/// written once by the dispatcher's outcome callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DeploymentStatus::Pending)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStatus::Pending => f.write_str("pending"),
            DeploymentStatus::Running => f.write_str("running"),
            DeploymentStatus::Failed => f.write_str("failed"),
        }
    }
}

/// A request to run one container image on one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub id: DeploymentId,
    #[serde(flatten)]
    pub owner: Owner,
    pub image_url: String,
    pub status: DeploymentStatus,
    /// Failure reason, present only when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of executing a deployment, applied to the ledger exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
}

/// Body of `POST /api/v1/deployments`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<TargetId>,
    #[serde(default)]
    pub image_url: String,
}

impl DeploymentRequest {
    /// Resolve the owner named by the request.
    ///
    /// Exactly one of `agent_id` / `cluster_id` must be set, and
    /// `image_url` must be non-empty.
    pub fn owner(&self) -> StateResult<Owner> {
        let agent = self.agent_id.as_deref().filter(|id| !id.is_empty());
        let cluster = self.cluster_id.as_deref().filter(|id| !id.is_empty());

        let owner = match (agent, cluster) {
            (Some(id), None) => Owner::Agent(id.to_string()),
            (None, Some(id)) => Owner::Cluster(id.to_string()),
            (Some(_), Some(_)) => {
                return Err(StateError::Invalid(
                    "only one of agent_id or cluster_id may be set",
                ));
            }
            (None, None) => {
                return Err(StateError::Invalid(
                    "agent_id or cluster_id, and image_url are required",
                ));
            }
        };

        if self.image_url.trim().is_empty() {
            let msg = match owner.kind() {
                TargetKind::Agent => "agent_id and image_url are required",
                TargetKind::Cluster => "cluster_id and image_url are required",
            };
            return Err(StateError::Invalid(msg));
        }

        Ok(owner)
    }
}

/// Query string of `GET /api/v1/deployments`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<TargetId>,
}

impl DeploymentQuery {
    pub fn owner(&self) -> StateResult<Owner> {
        let agent = self.agent_id.as_deref().filter(|id| !id.is_empty());
        let cluster = self.cluster_id.as_deref().filter(|id| !id.is_empty());
        match (agent, cluster) {
            (Some(id), None) => Ok(Owner::Agent(id.to_string())),
            (None, Some(id)) => Ok(Owner::Cluster(id.to_string())),
            (Some(_), Some(_)) => Err(StateError::Invalid(
                "only one of agent_id or cluster_id may be set",
            )),
            (None, None) => Err(StateError::Invalid(
                "agent_id or cluster_id query parameter is required",
            )),
        }
    }
}

impl From<Owner> for DeploymentQuery {
    fn from(owner: Owner) -> Self {
        match owner {
            Owner::Agent(id) => Self {
                agent_id: Some(id),
                cluster_id: None,
            },
            Owner::Cluster(id) => Self {
                agent_id: None,
                cluster_id: Some(id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn agent_seen_at(last_seen: DateTime<Utc>) -> Agent {
        Agent {
            id: "a-1".to_string(),
            address: "agent-1:9090".to_string(),
            last_seen,
            status: Liveness::Online,
        }
    }

    #[test]
    fn liveness_boundary_is_inclusive() {
        let seen = Utc::now();
        let agent = agent_seen_at(seen);
        let window = Duration::from_secs(45);

        assert_eq!(agent.liveness_at(seen + TimeDelta::seconds(45), window), Liveness::Online);
        assert_eq!(
            agent.liveness_at(seen + TimeDelta::milliseconds(45_001), window),
            Liveness::Offline
        );
    }

    #[test]
    fn liveness_tolerates_clock_skew() {
        let seen = Utc::now();
        let agent = agent_seen_at(seen);
        let earlier = seen - TimeDelta::seconds(10);
        assert_eq!(agent.liveness_at(earlier, Duration::from_secs(45)), Liveness::Online);
    }

    #[test]
    fn deployment_serializes_owner_as_flat_field() {
        let dep = Deployment {
            id: "dep-0a1b2c3d".to_string(),
            owner: Owner::Agent("X".to_string()),
            image_url: "nginx:latest".to_string(),
            status: DeploymentStatus::Pending,
            error: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&dep).unwrap();
        assert_eq!(json["agent_id"], "X");
        assert_eq!(json["status"], "pending");
        assert!(json.get("cluster_id").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("owner").is_none());

        let back: Deployment = serde_json::from_value(json).unwrap();
        assert_eq!(back, dep);
    }

    #[test]
    fn cluster_owned_deployment_parses_from_wire() {
        let body = r#"{
            "id": "dep-12345678",
            "cluster_id": "c-1",
            "image_url": "redis:7",
            "status": "failed",
            "error": "boom",
            "created_at": "2025-01-01T00:00:00Z"
        }"#;
        let dep: Deployment = serde_json::from_str(body).unwrap();
        assert_eq!(dep.owner, Owner::Cluster("c-1".to_string()));
        assert_eq!(dep.status, DeploymentStatus::Failed);
        assert_eq!(dep.error.as_deref(), Some("boom"));
    }

    #[test]
    fn deployment_request_requires_one_owner_and_image() {
        let ok = DeploymentRequest {
            cluster_id: Some("c-1".to_string()),
            image_url: "nginx".to_string(),
            ..Default::default()
        };
        assert_eq!(ok.owner().unwrap(), Owner::Cluster("c-1".to_string()));

        let no_image = DeploymentRequest {
            cluster_id: Some("c-1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            no_image.owner().unwrap_err().to_string(),
            "cluster_id and image_url are required"
        );

        let both = DeploymentRequest {
            agent_id: Some("a".to_string()),
            cluster_id: Some("c".to_string()),
            image_url: "nginx".to_string(),
        };
        assert!(both.owner().is_err());

        let empty_id = DeploymentRequest {
            agent_id: Some(String::new()),
            image_url: "nginx".to_string(),
            ..Default::default()
        };
        assert!(empty_id.owner().is_err());
    }

    #[test]
    fn registrations_reject_blank_fields() {
        assert!(AgentRegistration { address: "  ".to_string() }.validate().is_err());
        assert!(AgentRegistration { address: "agent-1:9090".to_string() }.validate().is_ok());

        let cluster = ClusterRegistration {
            name: "prod".to_string(),
            kubeconfig: String::new(),
        };
        assert_eq!(
            cluster.validate(),
            Err(StateError::Invalid("Name and kubeconfig are required"))
        );
    }

    #[test]
    fn deployment_query_names_exactly_one_owner() {
        let query: DeploymentQuery = Owner::Agent("a-1".to_string()).into();
        assert_eq!(query.owner().unwrap(), Owner::Agent("a-1".to_string()));

        assert_eq!(
            DeploymentQuery::default().owner().unwrap_err().to_string(),
            "agent_id or cluster_id query parameter is required"
        );

        let both = DeploymentQuery {
            agent_id: Some("a".to_string()),
            cluster_id: Some("c".to_string()),
        };
        assert!(both.owner().is_err());
    }

    #[test]
    fn heartbeat_requires_id() {
        assert!(Heartbeat::default().validate().is_err());
        let hb: Heartbeat = serde_json::from_str(r#"{"id":"a-1"}"#).unwrap();
        assert!(hb.validate().is_ok());
    }
}
