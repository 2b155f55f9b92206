//! Dispatcher: runs deployments out-of-band and records their outcome.
//!
//! Every dispatch becomes one tokio task that
//!
//! 1. waits for a permit from a semaphore sized `max_concurrent`,
//! 2. runs the executor in a nested task under the dispatch deadline,
//! 3. maps the result (including a panic or a timeout) to an [`Outcome`],
//! 4. applies it with [`Ledger::complete`], the only status write path.
//!
//! A failure is logged once at `error` level and never retried.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use keel_state::{Deployment, Ledger, Outcome};

use crate::error::{ExecuteError, ExecuteResult};
use crate::executor::{DispatchTarget, Executor};
use crate::metrics::{DispatchStats, StatsSnapshot};

pub const DEFAULT_MAX_CONCURRENT: usize = 16;
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Executions allowed to run at once; further dispatches queue.
    pub max_concurrent: usize,
    /// Deadline for a single execution.
    pub timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }
}

/// Cloneable handle; all clones share permits, counters and the ledger.
#[derive(Clone)]
pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    ledger: Ledger,
    permits: Arc<Semaphore>,
    timeout: Duration,
    stats: Arc<DispatchStats>,
    idle: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn Executor>, ledger: Ledger, config: DispatchConfig) -> Self {
        Self {
            executor,
            ledger,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout: config.timeout,
            stats: Arc::new(DispatchStats::default()),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Execute `deployment` on `target` in the background.
    ///
    /// Returns immediately. The handle resolves to the outcome after it
    /// has been written to the ledger; callers may drop it.
    pub fn dispatch(&self, target: DispatchTarget, deployment: Deployment) -> JoinHandle<Outcome> {
        self.stats.begin();
        debug!(
            deployment_id = %deployment.id,
            target = %target.kind(),
            target_id = %target.id(),
            "dispatch queued"
        );

        let this = self.clone();
        tokio::spawn(async move {
            let deployment_id = deployment.id.clone();
            let target_kind = target.kind();
            let target_id = target.id().to_string();

            let result = this.run(target, deployment).await;
            let timed_out = matches!(result, Err(ExecuteError::TimedOut(_)));

            let outcome = match result {
                Ok(()) => {
                    info!(%deployment_id, target = %target_kind, %target_id, "dispatch succeeded");
                    Outcome::Succeeded
                }
                Err(e) => {
                    error!(
                        %deployment_id,
                        target = %target_kind,
                        %target_id,
                        error = %e,
                        "dispatch failed"
                    );
                    Outcome::Failed(e.to_string())
                }
            };

            this.ledger.complete(&deployment_id, outcome.clone());
            let remaining = this
                .stats
                .finish(matches!(outcome, Outcome::Succeeded), timed_out);
            if remaining == 0 {
                this.idle.notify_one();
            }
            outcome
        })
    }

    async fn run(&self, target: DispatchTarget, deployment: Deployment) -> ExecuteResult<()> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExecuteError::ShuttingDown)?;

        let executor = self.executor.clone();
        let execution =
            tokio::spawn(async move { executor.execute(&target, &deployment).await });
        let abort = execution.abort_handle();

        match tokio::time::timeout(self.timeout, execution).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => Err(ExecuteError::Panicked),
            Ok(Err(_)) => Err(ExecuteError::ShuttingDown),
            Err(_) => {
                abort.abort();
                Err(ExecuteError::TimedOut(self.timeout))
            }
        }
    }

    /// Wait until no dispatch is in flight, or `grace` elapses.
    /// Returns `true` if everything finished.
    pub async fn drain(&self, grace: Duration) -> bool {
        let pending = self.stats.in_flight();
        if pending == 0 {
            return true;
        }
        info!(in_flight = pending, grace_secs = grace.as_secs(), "draining dispatches");

        let wait = async {
            while self.stats.in_flight() > 0 {
                self.idle.notified().await;
            }
        };
        match tokio::time::timeout(grace, wait).await {
            Ok(()) => true,
            Err(_) => {
                warn!(in_flight = self.stats.in_flight(), "drain grace period elapsed");
                false
            }
        }
    }

    /// Stop admitting work. Dispatches still waiting for a permit fail
    /// with [`ExecuteError::ShuttingDown`]; running ones are unaffected.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
