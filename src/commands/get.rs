use tabled::{Table, Tabled};

use crate::engine::ProvisioningEngine;
use crate::error::FhError;
use crate::settings::Settings;
use crate::stack::{DeployedStack, list_deployments};
use crate::values::{self, ConfigError};

#[derive(Debug, Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Last Update")]
    last_update: String,
    #[tabled(rename = "Deployment Info")]
    console: String,
    #[tabled(rename = "URL")]
    url: String,
}

impl From<DeployedStack> for DeploymentRow {
    fn from(stack: DeployedStack) -> Self {
        Self {
            name: stack.name,
            last_update: stack
                .last_update
                .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_default(),
            console: stack.console_url.map(String::from).unwrap_or_default(),
            url: stack.address,
        }
    }
}

pub async fn get(settings: &Settings) -> Result<(), FhError> {
    let org = resolve_org(settings)?;
    let engine = super::engine(settings).await?;
    match render(engine.as_ref(), &org).await? {
        Some(table) => println!("{table}"),
        None => log::info!("No fh apps currently deployed"),
    }
    Ok(())
}

/// The org comes from the flag or settings file, else from the values file.
fn resolve_org(settings: &Settings) -> Result<String, FhError> {
    if let Some(org) = &settings.org {
        return Ok(org.clone());
    }
    match values::parse(&settings.values) {
        Ok(spec) => Ok(spec.org),
        // An absent file or one without an org simply names no org.
        Err(ConfigError::ReadFailure { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Err(FhError::MissingOrg)
        }
        Err(ConfigError::MissingOrg) => Err(FhError::MissingOrg),
        Err(err) => Err(err.into()),
    }
}

async fn render(engine: &dyn ProvisioningEngine, org: &str) -> Result<Option<String>, FhError> {
    let deployments = list_deployments(engine, org).await?;
    if deployments.is_empty() {
        return Ok(None);
    }
    let rows: Vec<DeploymentRow> = deployments.into_iter().map(DeploymentRow::from).collect();
    Ok(Some(Table::new(rows).to_string()))
}
