//! keeld — the Keel control-center daemon.
//!
//! One process hosts both target kinds:
//! - agent registry with heartbeat liveness
//! - cluster registry (kubeconfig credentials)
//! - deployment ledger
//! - dispatcher (agent hand-off + Kubernetes executor)
//! - REST API, `/healthz` and `/metrics`

pub mod config;
pub mod server;

pub use config::{DaemonConfig, Overrides};
pub use server::{build_state, serve};
