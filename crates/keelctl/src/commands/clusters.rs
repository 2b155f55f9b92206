use std::path::Path;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use keel_client::ControlCenterClient;
use keel_state::Cluster;
use tabled::Tabled;

use super::{emit, render_table};
use crate::Format;

pub async fn list(client: &ControlCenterClient, format: Format) -> anyhow::Result<()> {
    let clusters = client.list_clusters().await?;
    emit(format, &clusters, || table(&clusters))
}

pub async fn add(
    client: &ControlCenterClient,
    name: &str,
    kubeconfig_path: &str,
    format: Format,
) -> anyhow::Result<()> {
    let encoded = read_kubeconfig(Path::new(kubeconfig_path))?;
    let cluster = client.register_cluster(name, &encoded).await?;
    emit(format, &cluster, || {
        format!(
            "Cluster '{}' registered successfully with ID: {}\n",
            cluster.name, cluster.id
        )
    })
}

/// Read a kubeconfig file and base64-encode it for transport.
pub fn read_kubeconfig(path: &Path) -> anyhow::Result<String> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read kubeconfig file {}", path.display()))?;
    Ok(STANDARD.encode(raw))
}

#[derive(Tabled)]
struct ClusterRow<'a> {
    #[tabled(rename = "ID")]
    id: &'a str,
    #[tabled(rename = "NAME")]
    name: &'a str,
}

fn table(clusters: &[Cluster]) -> String {
    render_table(clusters.iter().map(|c| ClusterRow {
        id: &c.id,
        name: &c.name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn kubeconfig_is_base64_encoded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"apiVersion: v1\nkind: Config\n").unwrap();

        let encoded = read_kubeconfig(file.path()).unwrap();
        assert_eq!(
            STANDARD.decode(encoded).unwrap(),
            b"apiVersion: v1\nkind: Config\n"
        );
    }

    #[test]
    fn missing_kubeconfig_is_an_error() {
        let err = read_kubeconfig(Path::new("/nonexistent/kubeconfig")).unwrap_err();
        assert!(err.to_string().contains("failed to read kubeconfig file"));
    }

    #[test]
    fn table_omits_kubeconfig() {
        let out = table(&[Cluster {
            id: "c-1".to_string(),
            name: "prod".to_string(),
            kubeconfig: "c2VjcmV0".to_string(),
        }]);
        assert!(out.contains("prod"));
        assert!(!out.contains("c2VjcmV0"));
    }
}
