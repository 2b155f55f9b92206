//! Prometheus text exposition format.
//!
//! Renders registry, ledger and dispatcher counters for scraping by a
//! Prometheus server or compatible agent.

use std::fmt::Write;

use keel_dispatch::StatsSnapshot;
use keel_state::DeploymentStatus;

use crate::ApiState;

/// Everything `/metrics` reports, read once per scrape.
#[derive(Debug, Clone, Default)]
pub struct Gauges {
    pub agents_total: usize,
    pub agents_online: usize,
    pub clusters_total: usize,
    pub pending: usize,
    pub running: usize,
    pub failed: usize,
    pub dispatch: StatsSnapshot,
}

impl Gauges {
    pub fn collect(state: &ApiState) -> Self {
        let counts = state.ledger.status_counts();
        let count = |s: DeploymentStatus| counts.get(&s).copied().unwrap_or(0);
        Self {
            agents_total: state.agents.len(),
            agents_online: state.agents.online_count(),
            clusters_total: state.clusters.len(),
            pending: count(DeploymentStatus::Pending),
            running: count(DeploymentStatus::Running),
            failed: count(DeploymentStatus::Failed),
            dispatch: state.dispatcher.stats(),
        }
    }
}

fn metric(out: &mut String, name: &str, kind: &str, help: &str, samples: &[(&str, u64)]) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    for (labels, value) in samples {
        if labels.is_empty() {
            let _ = writeln!(out, "{name} {value}");
        } else {
            let _ = writeln!(out, "{name}{{{labels}}} {value}");
        }
    }
}

/// Render gauges and counters in Prometheus text format.
pub fn render_prometheus(g: &Gauges) -> String {
    let mut out = String::new();

    metric(
        &mut out,
        "keel_agents",
        "gauge",
        "Registered agents by liveness.",
        &[
            ("status=\"online\"", g.agents_online as u64),
            (
                "status=\"offline\"",
                g.agents_total.saturating_sub(g.agents_online) as u64,
            ),
        ],
    );
    metric(
        &mut out,
        "keel_clusters",
        "gauge",
        "Registered clusters.",
        &[("", g.clusters_total as u64)],
    );
    metric(
        &mut out,
        "keel_deployments",
        "gauge",
        "Deployments by status.",
        &[
            ("status=\"pending\"", g.pending as u64),
            ("status=\"running\"", g.running as u64),
            ("status=\"failed\"", g.failed as u64),
        ],
    );
    metric(
        &mut out,
        "keel_dispatches_total",
        "counter",
        "Dispatches by result.",
        &[
            ("result=\"succeeded\"", g.dispatch.succeeded),
            ("result=\"failed\"", g.dispatch.failed),
        ],
    );
    metric(
        &mut out,
        "keel_dispatch_timeouts_total",
        "counter",
        "Dispatches that hit the deadline.",
        &[("", g.dispatch.timed_out)],
    );
    metric(
        &mut out,
        "keel_dispatches_in_flight",
        "gauge",
        "Dispatches queued or running.",
        &[("", g.dispatch.in_flight)],
    );

    out
}
