//! Deployment ledger: every deployment the control center has accepted.
//!
//! The ledger keeps two views behind one lock: the primary map
//! `id → Deployment` and a secondary index `owner → [id]` in insertion
//! order. Both are only ever modified together, so every id reachable
//! from the index exists in the primary map and vice versa.
//!
//! Records are append-only. The only mutation after creation is the
//! single `pending → running | failed` transition applied by
//! [`Ledger::complete`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::types::*;

struct Inner {
    deployments: HashMap<DeploymentId, Deployment>,
    by_owner: HashMap<Owner, Vec<DeploymentId>>,
    /// Latest `created_at` handed out; keeps timestamps non-decreasing.
    last_created: Option<DateTime<Utc>>,
}

/// Thread-safe, in-memory deployment ledger.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                deployments: HashMap::new(),
                by_owner: HashMap::new(),
                last_created: None,
            })),
            clock,
        }
    }

    /// Record a new pending deployment for `owner`.
    ///
    /// The owner is not checked against any registry; callers resolve
    /// the target first.
    pub fn create(&self, owner: Owner, image_url: impl Into<String>) -> Deployment {
        let now = self.clock.now();
        let mut inner = self.lock();

        let created_at = match inner.last_created {
            Some(last) if last > now => last,
            _ => now,
        };
        inner.last_created = Some(created_at);

        let mut id = generate_deployment_id();
        while inner.deployments.contains_key(&id) {
            id = generate_deployment_id();
        }

        let deployment = Deployment {
            id: id.clone(),
            owner: owner.clone(),
            image_url: image_url.into(),
            status: DeploymentStatus::Pending,
            error: None,
            created_at,
        };

        inner.deployments.insert(id.clone(), deployment.clone());
        inner.by_owner.entry(owner).or_default().push(id);

        info!(
            deployment_id = %deployment.id,
            owner = %deployment.owner,
            image = %deployment.image_url,
            "deployment created"
        );
        deployment
    }

    /// Copies of every deployment owned by `owner`, oldest first.
    /// Unknown owners yield an empty list.
    pub fn list_for_owner(&self, owner: &Owner) -> Vec<Deployment> {
        let inner = self.lock();
        inner
            .by_owner
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.deployments.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<Deployment> {
        self.lock().deployments.get(id).cloned()
    }

    /// Apply a dispatch outcome to a pending deployment.
    ///
    /// Returns `true` if the status changed. A deployment that already
    /// reached a terminal status is left untouched.
    pub fn complete(&self, id: &str, outcome: Outcome) -> bool {
        let mut inner = self.lock();
        let Some(deployment) = inner.deployments.get_mut(id) else {
            warn!(deployment_id = %id, "outcome for unknown deployment");
            return false;
        };

        if deployment.status.is_terminal() {
            debug!(
                deployment_id = %id,
                status = %deployment.status,
                "deployment already settled, ignoring outcome"
            );
            return false;
        }

        match outcome {
            Outcome::Succeeded => {
                deployment.status = DeploymentStatus::Running;
            }
            Outcome::Failed(reason) => {
                deployment.status = DeploymentStatus::Failed;
                deployment.error = Some(reason);
            }
        }
        debug!(deployment_id = %id, status = %deployment.status, "deployment status updated");
        true
    }

    pub fn len(&self) -> usize {
        self.lock().deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of deployments in each status.
    pub fn status_counts(&self) -> HashMap<DeploymentStatus, usize> {
        let mut counts = HashMap::new();
        for deployment in self.lock().deployments.values() {
            *counts.entry(deployment.status).or_insert(0) += 1;
        }
        counts
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// `dep-` followed by the first 8 hex digits of a v4 UUID.
fn generate_deployment_id() -> DeploymentId {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("dep-{}", &uuid[..8])
}
