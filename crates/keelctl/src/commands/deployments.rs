use keel_client::ControlCenterClient;
use keel_state::{Deployment, Owner};
use tabled::Tabled;

use super::{emit, render_table};
use crate::Format;

pub async fn deploy(
    client: &ControlCenterClient,
    owner: Owner,
    image: &str,
    format: Format,
) -> anyhow::Result<()> {
    let deployment = client.create_deployment(owner, image).await?;
    emit(format, &deployment, || {
        format!("Deployment created successfully!\n{}", details(&deployment))
    })
}

pub async fn list(client: &ControlCenterClient, owner: Owner, format: Format) -> anyhow::Result<()> {
    let deployments = client.list_deployments(owner).await?;
    emit(format, &deployments, || table(&deployments))
}

pub async fn get(client: &ControlCenterClient, id: &str, format: Format) -> anyhow::Result<()> {
    let deployment = client.get_deployment(id).await?;
    emit(format, &deployment, || details(&deployment))
}

fn owner_label(owner: &Owner) -> &'static str {
    match owner {
        Owner::Agent(_) => "Agent ID",
        Owner::Cluster(_) => "Cluster ID",
    }
}

fn details(d: &Deployment) -> String {
    let mut out = format!(
        "  ID: {}\n  {}: {}\n  Image: {}\n  Status: {}\n  Created: {}\n",
        d.id,
        owner_label(&d.owner),
        d.owner.id(),
        d.image_url,
        d.status,
        d.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    if let Some(error) = &d.error {
        out.push_str(&format!("  Error: {error}\n"));
    }
    out
}

#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "IMAGE")]
    image: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "CREATED")]
    created: String,
    #[tabled(rename = "ERROR")]
    error: String,
}

impl From<&Deployment> for DeploymentRow {
    fn from(d: &Deployment) -> Self {
        Self {
            id: d.id.clone(),
            image: d.image_url.clone(),
            status: d.status.to_string(),
            created: d.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            error: d.error.clone().unwrap_or_default(),
        }
    }
}

fn table(deployments: &[Deployment]) -> String {
    render_table(deployments.iter().map(DeploymentRow::from))
}
