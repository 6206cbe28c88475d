//! Entry points of the `fh` subcommands.

pub mod destroy;
pub mod get;
pub mod up;

use std::sync::Arc;

use crate::engine::{ProvisioningEngine, PulumiCli};
use crate::error::FhError;
use crate::settings::Settings;

async fn engine(settings: &Settings) -> Result<Arc<dyn ProvisioningEngine>, FhError> {
    let cli = PulumiCli::new(&settings.pulumi).await?;
    log::debug!("Engine workspace at {:?}", cli.work_dir());
    Ok(Arc::new(cli))
}
