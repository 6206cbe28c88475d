use std::io::Write;

use crate::cli::DestroyArgs;
use crate::error::FhError;
use crate::program::ProgramOptions;
use crate::settings::Settings;
use crate::stack::{TeardownOptions, TeardownOutcome, TerminalConfirm, teardown};
use crate::values;

pub async fn destroy(settings: &Settings, args: &DestroyArgs) -> Result<(), FhError> {
    let spec = values::parse_with(&settings.values, &settings.overrides())?;
    let engine = super::engine(settings).await?;
    let options = TeardownOptions {
        preview_only: args.preview,
        verbose: args.verbose,
        program: ProgramOptions {
            directory: args.dir.clone(),
            ..Default::default()
        },
    };

    let outcome = teardown(engine.as_ref(), &spec, &TerminalConfirm, &options, stdout).await?;
    match outcome {
        TeardownOutcome::Cancelled => log::info!("User cancelled, not deleting"),
        TeardownOutcome::Previewed => log::info!("Dry run of {} complete", spec.display_name()),
        TeardownOutcome::Destroyed => log::info!("Deleted {}", spec.display_name()),
    }
    Ok(())
}

fn stdout() -> Box<dyn Write + Send> {
    Box::new(std::io::stdout())
}
