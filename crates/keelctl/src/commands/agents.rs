use keel_client::ControlCenterClient;
use keel_state::Agent;
use tabled::Tabled;

use super::{emit, render_table};
use crate::Format;

pub async fn list(client: &ControlCenterClient, format: Format) -> anyhow::Result<()> {
    let agents = client.list_agents().await?;
    emit(format, &agents, || table(&agents))
}

#[derive(Tabled)]
struct AgentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "LAST SEEN")]
    last_seen: String,
}

impl From<&Agent> for AgentRow {
    fn from(a: &Agent) -> Self {
        Self {
            id: a.id.clone(),
            address: a.address.clone(),
            status: a.status.to_string(),
            last_seen: a.last_seen.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }
}

fn table(agents: &[Agent]) -> String {
    render_table(agents.iter().map(AgentRow::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use keel_state::Liveness;

    #[test]
    fn table_shows_liveness() {
        let out = table(&[Agent {
            id: "a-1".to_string(),
            address: "agent-1:9090".to_string(),
            last_seen: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            status: Liveness::Offline,
        }]);
        let row = out.lines().nth(1).unwrap();
        assert!(row.contains("agent-1:9090"));
        assert!(row.contains("offline"));
        assert!(row.contains("2025-03-01T12:00:00Z"));
    }
}
