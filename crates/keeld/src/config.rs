//! keeld.toml configuration.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [liveness]
//! window_secs = 45
//!
//! [dispatch]
//! max_concurrent = 16
//! timeout_secs = 60
//! kube_request_timeout_secs = 10
//! shutdown_grace_secs = 30
//! ```
//!
//! Every key is optional. Command-line flags override the file.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use keel_dispatch::{DEFAULT_DISPATCH_TIMEOUT, DEFAULT_MAX_CONCURRENT, DEFAULT_REQUEST_TIMEOUT, DispatchConfig};
use keel_state::DEFAULT_LIVENESS_WINDOW;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub liveness: LivenessConfig,
    pub dispatch: DispatchSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LivenessConfig {
    pub window_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_LIVENESS_WINDOW.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub kube_request_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: DEFAULT_DISPATCH_TIMEOUT.as_secs(),
            kube_request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            shutdown_grace_secs: 30,
        }
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub liveness_window_secs: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub dispatch_timeout_secs: Option<u64>,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given, else defaults; then apply overrides and
    /// validate.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(listen) = overrides.listen {
            self.server.listen = listen;
        }
        if let Some(secs) = overrides.liveness_window_secs {
            self.liveness.window_secs = secs;
        }
        if let Some(n) = overrides.max_concurrent {
            self.dispatch.max_concurrent = n;
        }
        if let Some(secs) = overrides.dispatch_timeout_secs {
            self.dispatch.timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.liveness.window_secs == 0 {
            bail!("liveness.window_secs must be greater than zero");
        }
        if self.dispatch.max_concurrent == 0 {
            bail!("dispatch.max_concurrent must be greater than zero");
        }
        if self.dispatch.timeout_secs == 0 {
            bail!("dispatch.timeout_secs must be greater than zero");
        }
        if self.dispatch.kube_request_timeout_secs == 0 {
            bail!("dispatch.kube_request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness.window_secs)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_concurrent: self.dispatch.max_concurrent,
            timeout: Duration::from_secs(self.dispatch.timeout_secs),
        }
    }

    pub fn kube_request_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.kube_request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.dispatch.shutdown_grace_secs)
    }
}
