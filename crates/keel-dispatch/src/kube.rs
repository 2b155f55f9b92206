//! Kubernetes executor. Creates a `Deployment` object in a cluster.
//!
//! The cluster's credentials arrive as a base64-encoded kubeconfig. Each
//! dispatch decodes it, resolves the current context to an API server
//! endpoint, builds a client for that endpoint and issues exactly one
//! create call:
//!
//! ```text
//! POST {server}/apis/apps/v1/namespaces/{namespace}/deployments
//! ```
//!
//! The object is named after the deployment id, so a repeated create is
//! rejected by the API server with `409 Conflict`, which is treated as
//! success.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Certificate, Identity, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use keel_state::{Cluster, Deployment};

use crate::error::{ExecuteError, ExecuteResult};
use crate::executor::{BoxFuture, DispatchTarget, Executor};

/// Default per-request timeout against the API server.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_NAMESPACE: &str = "default";

// ── Kubeconfig ─────────────────────────────────────────────────────

/// The subset of a kubeconfig document needed to reach an API server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub current_context: Option<String>,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    /// CA file path. Only the inline `-data` form is supported.
    #[serde(default)]
    pub certificate_authority: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: UserEntry,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub exec: Option<serde_yaml::Value>,
    #[serde(default)]
    pub auth_provider: Option<serde_yaml::Value>,
}

/// How requests authenticate against the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

/// A fully resolved API server endpoint.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    pub server: String,
    pub namespace: String,
    pub auth: Auth,
    /// PEM bundle of the cluster CA.
    pub ca_pem: Option<Vec<u8>>,
    /// Client certificate followed by its private key, PEM.
    pub identity_pem: Option<Vec<u8>>,
    pub insecure: bool,
}

impl Kubeconfig {
    /// Parse a kubeconfig from raw YAML bytes.
    pub fn from_slice(raw: &[u8]) -> ExecuteResult<Self> {
        serde_yaml::from_slice(raw).map_err(|e| ExecuteError::Kubeconfig(e.to_string()))
    }

    /// Parse a base64-encoded kubeconfig, as stored on a [`Cluster`].
    pub fn from_base64(encoded: &str) -> ExecuteResult<Self> {
        let raw = STANDARD.decode(encoded.trim())?;
        Self::from_slice(&raw)
    }

    /// Resolve the current context to an endpoint.
    ///
    /// Without `current-context`, a kubeconfig holding exactly one
    /// context uses it.
    pub fn resolve(&self) -> ExecuteResult<ApiEndpoint> {
        let context = match self.current_context.as_deref() {
            Some(name) => self
                .contexts
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| invalid(format!("context {name:?} not found")))?,
            None => match self.contexts.as_slice() {
                [only] => only,
                [] => return Err(invalid("no contexts defined")),
                _ => return Err(invalid("current-context is not set")),
            },
        };

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .ok_or_else(|| invalid(format!("cluster {:?} not found", context.context.cluster)))?;

        let user = match context.context.user.as_deref() {
            Some(name) => Some(
                self.users
                    .iter()
                    .find(|u| u.name == name)
                    .ok_or_else(|| invalid(format!("user {name:?} not found")))?,
            ),
            None => None,
        };

        if cluster.cluster.certificate_authority.is_some() {
            return Err(unsupported("certificate-authority"));
        }
        if cluster.cluster.server.trim().is_empty() {
            return Err(invalid(format!("cluster {:?} has no server", cluster.name)));
        }

        let ca_pem = cluster
            .cluster
            .certificate_authority_data
            .as_deref()
            .map(decode_field)
            .transpose()?;

        let (auth, identity_pem) = match user {
            Some(u) => resolve_user(&u.user)?,
            None => (Auth::None, None),
        };

        Ok(ApiEndpoint {
            server: cluster.cluster.server.trim_end_matches('/').to_string(),
            namespace: context
                .context
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            auth,
            ca_pem,
            identity_pem,
            insecure: cluster.cluster.insecure_skip_tls_verify,
        })
    }
}

fn resolve_user(user: &UserEntry) -> ExecuteResult<(Auth, Option<Vec<u8>>)> {
    if user.client_certificate.is_some() {
        return Err(unsupported("client-certificate"));
    }
    if user.client_key.is_some() {
        return Err(unsupported("client-key"));
    }
    if user.exec.is_some() {
        return Err(unsupported("exec"));
    }
    if user.auth_provider.is_some() {
        return Err(unsupported("auth-provider"));
    }

    let identity_pem = match (&user.client_certificate_data, &user.client_key_data) {
        (Some(cert), Some(key)) => {
            let mut pem = decode_field(cert)?;
            pem.push(b'\n');
            pem.extend(decode_field(key)?);
            Some(pem)
        }
        (None, None) => None,
        _ => {
            return Err(invalid(
                "client-certificate-data and client-key-data must be set together",
            ));
        }
    };

    let auth = match (&user.token, &user.username, &user.password) {
        (Some(token), _, _) => Auth::Bearer(token.clone()),
        (None, Some(username), Some(password)) => Auth::Basic {
            username: username.clone(),
            password: password.clone(),
        },
        _ => Auth::None,
    };

    Ok((auth, identity_pem))
}

fn decode_field(value: &str) -> ExecuteResult<Vec<u8>> {
    Ok(STANDARD.decode(value.trim())?)
}

fn invalid(msg: impl Into<String>) -> ExecuteError {
    ExecuteError::Kubeconfig(msg.into())
}

fn unsupported(key: &str) -> ExecuteError {
    invalid(format!("{key} is not supported, inline credentials are required"))
}

impl ApiEndpoint {
    /// Build an HTTP client trusting the cluster CA and presenting the
    /// client identity, if any.
    pub fn client(&self, timeout: Duration) -> ExecuteResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if let Some(ca) = &self.ca_pem {
            let cert = Certificate::from_pem(ca).map_err(|e| ExecuteError::Client(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(pem) = &self.identity_pem {
            let identity =
                Identity::from_pem(pem).map_err(|e| ExecuteError::Client(e.to_string()))?;
            builder = builder.identity(identity);
        }
        if self.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(|e| ExecuteError::Client(e.to_string()))
    }

    pub fn deployments_url(&self) -> String {
        format!(
            "{}/apis/apps/v1/namespaces/{}/deployments",
            self.server, self.namespace
        )
    }
}

// ── Manifest ───────────────────────────────────────────────────────

/// The `apps/v1` Deployment object created for a Keel deployment:
/// one replica of one `workload` container, selected by `app=<id>`.
pub fn deployment_manifest(deployment: &Deployment) -> serde_json::Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": deployment.id,
        },
        "spec": {
            "replicas": 1,
            "selector": {
                "matchLabels": { "app": deployment.id },
            },
            "template": {
                "metadata": {
                    "labels": { "app": deployment.id },
                },
                "spec": {
                    "containers": [{
                        "name": "workload",
                        "image": deployment.image_url,
                    }],
                },
            },
        },
    })
}

// ── Executor ───────────────────────────────────────────────────────

/// Executes cluster deployments against the Kubernetes API.
#[derive(Debug, Clone)]
pub struct KubeExecutor {
    request_timeout: Duration,
}

impl KubeExecutor {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    /// Create the workload for `deployment` in `cluster`.
    pub async fn deploy(&self, cluster: &Cluster, deployment: &Deployment) -> ExecuteResult<()> {
        let endpoint = Kubeconfig::from_base64(&cluster.kubeconfig)?.resolve()?;
        let client = endpoint.client(self.request_timeout)?;

        info!(
            deployment_id = %deployment.id,
            image = %deployment.image_url,
            cluster = %cluster.name,
            namespace = %endpoint.namespace,
            "creating kubernetes deployment"
        );

        let mut request = client
            .post(endpoint.deployments_url())
            .json(&deployment_manifest(deployment));
        request = match &endpoint.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::None => request,
        };

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            info!(deployment_id = %deployment.id, cluster = %cluster.name, "kubernetes deployment created");
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            info!(deployment_id = %deployment.id, cluster = %cluster.name, "kubernetes deployment already exists");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ExecuteError::Remote {
            status: status.as_u16(),
            message: remote_message(&body),
        })
    }
}

impl Default for KubeExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl Executor for KubeExecutor {
    fn execute<'a>(
        &'a self,
        target: &'a DispatchTarget,
        deployment: &'a Deployment,
    ) -> BoxFuture<'a, ExecuteResult<()>> {
        Box::pin(async move {
            match target {
                DispatchTarget::Cluster(cluster) => self.deploy(cluster, deployment).await,
                other => Err(ExecuteError::Unsupported {
                    executor: "kubernetes",
                    kind: other.kind(),
                }),
            }
        })
    }
}

/// Pull the `message` out of a Kubernetes `Status` body, falling back to
/// the raw body.
fn remote_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Status {
        message: String,
    }

    match serde_json::from_str::<Status>(body) {
        Ok(status) => status.message,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.len() > 512 {
                let cut = (0..=512).rev().find(|i| trimmed.is_char_boundary(*i)).unwrap_or(0);
                format!("{}...", &trimmed[..cut])
            } else {
                trimmed.to_string()
            }
        }
    }
}
