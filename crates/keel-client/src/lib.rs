//! keel-client — HTTP client for the Keel control-center API.
//!
//! Shared by the edge agent and `keelctl`. Every method maps one REST
//! call; non-success responses become [`ClientError::Api`] carrying the
//! server's `{"error"}` message.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use keel_state::{
    Agent, AgentRegistration, Cluster, ClusterRegistration, Deployment, DeploymentQuery,
    DeploymentRequest, Heartbeat, Owner,
};

/// Environment variable naming the control-center base URL.
pub const CONTROL_CENTER_ENV: &str = "CONTROL_CENTER_ADDR";

/// Used when [`CONTROL_CENTER_ENV`] is unset.
pub const DEFAULT_CONTROL_CENTER_ADDR: &str = "http://localhost:8080";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("control center returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

impl ClientError {
    /// HTTP status of an API error, if the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct ControlCenterClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControlCenterClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    // ── Agents ─────────────────────────────────────────────────────

    pub async fn register_agent(&self, address: &str) -> ClientResult<Agent> {
        let body = AgentRegistration {
            address: address.to_string(),
        };
        let resp = self.http.post(self.url("/agents")).json(&body).send().await?;
        decode(resp).await
    }

    pub async fn list_agents(&self) -> ClientResult<Vec<Agent>> {
        let resp = self.http.get(self.url("/agents")).send().await?;
        decode(resp).await
    }

    pub async fn heartbeat(&self, agent_id: &str) -> ClientResult<()> {
        let body = Heartbeat {
            id: agent_id.to_string(),
        };
        let resp = self.http.post(self.url("/heartbeat")).json(&body).send().await?;
        check(resp).await.map(drop)
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Register a cluster. `kubeconfig` must already be base64-encoded.
    pub async fn register_cluster(&self, name: &str, kubeconfig: &str) -> ClientResult<Cluster> {
        let body = ClusterRegistration {
            name: name.to_string(),
            kubeconfig: kubeconfig.to_string(),
        };
        let resp = self.http.post(self.url("/clusters")).json(&body).send().await?;
        decode(resp).await
    }

    pub async fn list_clusters(&self) -> ClientResult<Vec<Cluster>> {
        let resp = self.http.get(self.url("/clusters")).send().await?;
        decode(resp).await
    }

    // ── Deployments ────────────────────────────────────────────────

    pub async fn create_deployment(&self, owner: Owner, image_url: &str) -> ClientResult<Deployment> {
        let query = DeploymentQuery::from(owner);
        let body = DeploymentRequest {
            agent_id: query.agent_id,
            cluster_id: query.cluster_id,
            image_url: image_url.to_string(),
        };
        let resp = self.http.post(self.url("/deployments")).json(&body).send().await?;
        decode(resp).await
    }

    pub async fn list_deployments(&self, owner: Owner) -> ClientResult<Vec<Deployment>> {
        let resp = self
            .http
            .get(self.url("/deployments"))
            .query(&DeploymentQuery::from(owner))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn get_deployment(&self, id: &str) -> ClientResult<Deployment> {
        let resp = self
            .http
            .get(self.url(&format!("/deployments/{id}")))
            .send()
            .await?;
        decode(resp).await
    }
}

async fn check(resp: Response) -> ClientResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    let text = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.error,
        Err(_) => text.trim().to_string(),
    };
    debug!(%status, %message, "control center rejected request");
    Err(ClientError::Api { status, message })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
    Ok(check(resp).await?.json().await?)
}
