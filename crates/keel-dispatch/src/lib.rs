//! keel-dispatch — asynchronous execution of deployments.
//!
//! The API handler creates a pending record in the ledger and hands the
//! deployment to the [`Dispatcher`] together with its resolved target.
//! The dispatcher runs an [`Executor`] in the background and writes the
//! outcome back:
//!
//! ```text
//! pending ──executor Ok──▶ running
//!    └────executor Err / timeout / panic──▶ failed (+ error)
//! ```
//!
//! Executors:
//!
//! - [`KubeExecutor`] creates an `apps/v1` Deployment in a cluster using
//!   the cluster's kubeconfig.
//! - [`AgentExecutor`] hands work to an edge agent, which pulls it on its
//!   next poll.
//! - [`TargetExecutor`] routes between the two by target kind.

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod kube;
pub mod metrics;

pub use dispatcher::{DEFAULT_DISPATCH_TIMEOUT, DEFAULT_MAX_CONCURRENT, DispatchConfig, Dispatcher};
pub use error::{ExecuteError, ExecuteResult};
pub use executor::{AgentExecutor, BoxFuture, DispatchTarget, Executor, TargetExecutor};
pub use kube::{DEFAULT_REQUEST_TIMEOUT, KubeExecutor, Kubeconfig};
pub use metrics::StatsSnapshot;
