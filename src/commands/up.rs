use std::sync::Arc;

use crate::cli::UpArgs;
use crate::engine::ProvisioningEngine;
use crate::error::FhError;
use crate::program::ProgramOptions;
use crate::progress::LogReporter;
use crate::settings::Settings;
use crate::stack::{Observation, RunMode, StackLifecycle, Workflow};
use crate::values::{self, DeploymentSpec};

pub async fn up(settings: &Settings, args: &UpArgs) -> Result<(), FhError> {
    let spec = values::parse_with(&settings.values, &settings.overrides())?;
    let engine = super::engine(settings).await?;
    let options = ProgramOptions {
        directory: args.dir.clone(),
        nlb: args.nlb,
    };
    deploy(engine, &spec, &options, args.preview, args.verbose).await
}

/// Run the IAM role workflow when the application needs one, then the
/// application itself.
pub async fn deploy(
    engine: Arc<dyn ProvisioningEngine>,
    spec: &DeploymentSpec,
    options: &ProgramOptions,
    preview: bool,
    verbose: bool,
) -> Result<(), FhError> {
    if spec.aws.iam_role {
        let mut role = StackLifecycle::new(engine.clone(), Workflow::iam_role(spec));
        role.run(run_mode(preview, verbose)).await?;
    }

    let mut application = StackLifecycle::new(engine, Workflow::application(spec, options));
    application.run(run_mode(preview, verbose)).await?;

    if preview {
        log::info!("Dry run of {} complete", spec.display_name());
    } else {
        log::info!("Deployed {}", spec.display_name());
    }
    Ok(())
}

fn run_mode(preview: bool, verbose: bool) -> RunMode<LogReporter> {
    if preview {
        RunMode::Preview(Box::new(std::io::stdout()))
    } else if verbose {
        RunMode::Apply(Observation::Verbose(Box::new(std::io::stdout())))
    } else {
        RunMode::Apply(Observation::Classified(LogReporter))
    }
}
