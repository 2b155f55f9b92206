//! Target registry for agents and clusters.
//!
//! A `Registry<T>` holds every target of one kind behind a single lock.
//! Targets are never removed; ids are UUID v4 strings assigned once at
//! registration.
//!
//! Agent liveness is computed lazily: `list()` recomputes every agent's
//! status from its `last_seen` before returning, and no background task
//! sweeps the registry. Status can therefore be stale between a heartbeat
//! and the next listing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{StateError, StateResult};
use crate::types::*;

/// Agents that have not been heard from for longer than this are offline.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(45);

/// A record the registry can hold.
pub trait Target: Clone + Send + 'static {
    const KIND: TargetKind;

    fn id(&self) -> &str;

    /// Recompute derived state before the target is listed.
    fn refresh(&mut self, _now: DateTime<Utc>, _window: Duration) {}
}

impl Target for Agent {
    const KIND: TargetKind = TargetKind::Agent;

    fn id(&self) -> &str {
        &self.id
    }

    fn refresh(&mut self, now: DateTime<Utc>, window: Duration) {
        self.status = self.liveness_at(now, window);
    }
}

impl Target for Cluster {
    const KIND: TargetKind = TargetKind::Cluster;

    fn id(&self) -> &str {
        &self.id
    }
}

struct Inner<T> {
    targets: HashMap<TargetId, T>,
    /// Registration order, for stable listings.
    order: Vec<TargetId>,
}

/// Thread-safe registry of one kind of target.
#[derive(Clone)]
pub struct Registry<T> {
    inner: Arc<Mutex<Inner<T>>>,
    clock: Arc<dyn Clock>,
    liveness_window: Duration,
}

pub type AgentRegistry = Registry<Agent>;
pub type ClusterRegistry = Registry<Cluster>;

impl<T: Target> Registry<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                targets: HashMap::new(),
                order: Vec::new(),
            })),
            clock,
            liveness_window: DEFAULT_LIVENESS_WINDOW,
        }
    }

    /// Set the liveness window used by `list()`.
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    /// Point lookup. Does not recompute liveness.
    pub fn get(&self, id: &str) -> Option<T> {
        self.lock().targets.get(id).cloned()
    }

    /// Like [`get`](Self::get), but an unknown id is an error.
    pub fn require(&self, id: &str) -> StateResult<T> {
        self.get(id).ok_or_else(|| StateError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        })
    }

    /// List every target in registration order, recomputing derived
    /// status first.
    pub fn list(&self) -> Vec<T> {
        let now = self.clock.now();
        let window = self.liveness_window;
        let mut inner = self.lock();
        let Inner { targets, order } = &mut *inner;

        let mut listed = Vec::with_capacity(order.len());
        for id in order.iter() {
            if let Some(target) = targets.get_mut(id) {
                target.refresh(now, window);
                listed.push(target.clone());
            }
        }
        listed
    }

    pub fn len(&self) -> usize {
        self.lock().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a fresh id and store the target built from it.
    fn insert_with(&self, build: impl FnOnce(TargetId, DateTime<Utc>) -> T) -> T {
        let now = self.clock.now();
        let mut inner = self.lock();

        let mut id = Uuid::new_v4().to_string();
        while inner.targets.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }

        let target = build(id.clone(), now);
        inner.targets.insert(id.clone(), target.clone());
        inner.order.push(id);
        target
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // No method panics while holding the lock, so a poisoned guard
        // still protects consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Target> Default for Registry<T> {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

// ── Agents ─────────────────────────────────────────────────────────

impl Registry<Agent> {
    /// Register a new agent. It starts online with `last_seen = now`.
    pub fn register(&self, address: impl Into<String>) -> Agent {
        let address = address.into();
        let agent = self.insert_with(|id, now| Agent {
            id,
            address,
            last_seen: now,
            status: Liveness::Online,
        });
        info!(agent_id = %agent.id, address = %agent.address, "agent registered");
        agent
    }

    /// Record a heartbeat. Returns whether the agent is known.
    pub fn heartbeat(&self, id: &str) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        match inner.targets.get_mut(id) {
            Some(agent) => {
                agent.last_seen = now;
                agent.status = Liveness::Online;
                debug!(agent_id = %id, "heartbeat received");
                true
            }
            None => {
                warn!(agent_id = %id, "heartbeat from unknown agent");
                false
            }
        }
    }

    /// Liveness of a single agent as of now, without touching the
    /// stored status. `None` if the agent is unknown.
    pub fn is_live(&self, id: &str) -> Option<bool> {
        let now = self.clock.now();
        self.lock()
            .targets
            .get(id)
            .map(|agent| agent.liveness_at(now, self.liveness_window) == Liveness::Online)
    }

    /// Number of agents that are live right now.
    pub fn online_count(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .targets
            .values()
            .filter(|agent| agent.liveness_at(now, self.liveness_window) == Liveness::Online)
            .count()
    }
}

// ── Clusters ───────────────────────────────────────────────────────

impl Registry<Cluster> {
    /// Register a new cluster. The kubeconfig is stored as given.
    pub fn register(&self, name: impl Into<String>, kubeconfig: impl Into<String>) -> Cluster {
        let name = name.into();
        let kubeconfig = kubeconfig.into();
        let cluster = self.insert_with(|id, _| Cluster {
            id,
            name,
            kubeconfig,
        });
        info!(cluster_id = %cluster.id, name = %cluster.name, "cluster registered");
        cluster
    }
}
