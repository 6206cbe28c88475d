use chrono::{DateTime, Utc};
use url::Url;

use crate::engine::{EngineError, OutputMap, ProvisioningEngine};
use crate::error::Stage;
use crate::stack::identity::{PROJECT, StackIdentity};

/// A deployed application as reported by `fh get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedStack {
    pub name: String,
    pub last_update: Option<DateTime<Utc>>,
    /// Page of the stack in the engine's console.
    pub console_url: Option<Url>,
    /// Public address of the application, empty when it has none.
    pub address: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("{stage} failed for org {org}: {source}")]
    Listing {
        stage: Stage,
        org: String,
        #[source]
        source: EngineError,
    },
    #[error("{stage} failed for stack {stack}: {source}")]
    Stack {
        stage: Stage,
        stack: String,
        #[source]
        source: EngineError,
    },
}

/// List every fh application deployed in `org`, with its address.
pub async fn list_deployments(
    engine: &dyn ProvisioningEngine,
    org: &str,
) -> Result<Vec<DeployedStack>, InventoryError> {
    let summaries = engine
        .list_stacks(org, PROJECT)
        .await
        .map_err(|source| InventoryError::Listing {
            stage: Stage::ListStacks,
            org: org.to_string(),
            source,
        })?;
    log::debug!("Found {} stacks in {org}", summaries.len());

    let mut deployments = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let identity = StackIdentity::new(org, summary.short_name());
        engine
            .select_stack(&identity)
            .await
            .map_err(|source| stack_error(Stage::ResolveStack, &identity, source))?;
        let outputs = engine
            .outputs(&identity)
            .await
            .map_err(|source| stack_error(Stage::StackOutputs, &identity, source))?;

        deployments.push(DeployedStack {
            name: identity.name().to_string(),
            last_update: summary.last_update,
            console_url: summary.url,
            address: address_url(&outputs),
        });
    }
    Ok(deployments)
}

fn stack_error(stage: Stage, identity: &StackIdentity, source: EngineError) -> InventoryError {
    InventoryError::Stack {
        stage,
        stack: identity.to_string(),
        source,
    }
}

/// `http://` plus the `address` output, or an empty string.
pub fn address_url(outputs: &OutputMap) -> String {
    match outputs.get("address").and_then(|value| value.as_str()) {
        Some(address) if !address.is_empty() => format!("http://{address}"),
        _ => String::new(),
    }
}
