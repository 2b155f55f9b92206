//! keel-state — in-memory state for the Keel control center.
//!
//! Owns the two pieces of shared mutable state in the process:
//!
//! - [`Registry`]: deployment targets (edge agents and Kubernetes
//!   clusters), with heartbeat-derived liveness for agents.
//! - [`Ledger`]: deployment records, indexed by id and by owning target.
//!
//! # Architecture
//!
//! ```text
//! Registry<Agent>   ── one Mutex over all agents, liveness recomputed on list()
//! Registry<Cluster> ── one Mutex over all clusters
//! Ledger            ── one Mutex over { id → Deployment, owner → [id] }
//! ```
//!
//! Every store is `Clone` (backed by `Arc`) and can be shared across tasks.
//! Nothing is persisted; state lives for the lifetime of the process.
//! Time is read through a [`Clock`] so liveness can be driven by tests.

pub mod clock;
pub mod error;
pub mod ledger;
pub mod registry;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StateError, StateResult};
pub use ledger::Ledger;
pub use registry::{AgentRegistry, ClusterRegistry, Registry, Target, DEFAULT_LIVENESS_WINDOW};
pub use types::*;
