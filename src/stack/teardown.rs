//! Destroying a deployed application, after the operator agreed to it.

use std::io::Write;

use crate::engine::{DestroyOptions, EngineError, ProvisioningEngine};
use crate::error::Stage;
use crate::program::{Program, ProgramOptions};
use crate::stack::identity::StackIdentity;
use crate::values::DeploymentSpec;

/// Asks the operator a yes/no question.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Prompts on the terminal. Defaults to no.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        match dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(err) => {
                log::warn!("Unable to prompt for confirmation: {err}");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownOptions {
    pub preview_only: bool,
    pub verbose: bool,
    pub program: ProgramOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The operator declined, nothing was touched.
    Cancelled,
    Destroyed,
    Previewed,
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} failed for stack {stack}: {source}")]
pub struct TeardownError {
    pub stage: Stage,
    pub stack: String,
    #[source]
    pub source: EngineError,
}

pub fn confirmation_prompt(spec: &DeploymentSpec) -> String {
    format!(
        "This will delete the application {}. Are you sure you wish to continue?",
        spec.display_name()
    )
}

/// Destroy the application stack, and its IAM role stack when it has one.
pub async fn teardown(
    engine: &dyn ProvisioningEngine,
    spec: &DeploymentSpec,
    confirm: &dyn Confirm,
    options: &TeardownOptions,
    out: impl Fn() -> Box<dyn Write + Send>,
) -> Result<TeardownOutcome, TeardownError> {
    if !confirm.confirm(&confirmation_prompt(spec)) {
        return Ok(TeardownOutcome::Cancelled);
    }

    let application = StackIdentity::for_application(spec);
    engine
        .select_stack(&application)
        .await
        .map_err(|source| stage_error(Stage::ResolveStack, &application, source))?;
    engine
        .set_program(&Program::application(spec, &options.program))
        .await
        .map_err(|source| stage_error(Stage::Configure, &application, source))?;
    destroy(engine, &application, options, out()).await?;

    if spec.aws.iam_role {
        let role = StackIdentity::for_iam_role(spec);
        engine
            .select_stack(&role)
            .await
            .map_err(|source| stage_error(Stage::ResolveStack, &role, source))?;
        engine
            .set_program(&Program::iam_role(&role))
            .await
            .map_err(|source| stage_error(Stage::Configure, &role, source))?;
        destroy(engine, &role, options, out()).await?;
    }

    Ok(if options.preview_only {
        TeardownOutcome::Previewed
    } else {
        TeardownOutcome::Destroyed
    })
}

fn stage_error(stage: Stage, identity: &StackIdentity, source: EngineError) -> TeardownError {
    TeardownError {
        stage,
        stack: identity.to_string(),
        source,
    }
}

async fn destroy(
    engine: &dyn ProvisioningEngine,
    identity: &StackIdentity,
    options: &TeardownOptions,
    out: Box<dyn Write + Send>,
) -> Result<(), TeardownError> {
    if options.preview_only {
        log::info!("Previewing removal of {identity}");
    } else {
        log::info!("Destroying {identity}");
    }
    let destroy_options = DestroyOptions {
        preview_only: options.preview_only,
    };
    // Non-verbose runs still need somewhere for the engine to write.
    let out: Box<dyn Write + Send> = if options.verbose || options.preview_only {
        out
    } else {
        Box::new(std::io::sink())
    };
    engine
        .destroy(identity, destroy_options, out)
        .await
        .map_err(|source| stage_error(Stage::Destroy, identity, source))?;
    if !options.preview_only {
        log::info!("Destroyed {identity}");
    }
    Ok(())
}
