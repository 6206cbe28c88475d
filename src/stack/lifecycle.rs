//! The create, configure, preview and apply sequence of a single stack.
//!
//! [`StackLifecycle`] is a small state machine. Each step checks the
//! current state before talking to the engine, so a step called out of
//! order never reaches it. Once a step fails the lifecycle stays failed.

use std::{fmt, io::Write, sync::Arc};

use tokio::sync::mpsc::unbounded_channel;

use crate::engine::{
    AWS_PLUGIN, ConfigValue, DOCKER_PLUGIN, EngineError, KUBERNETES_PLUGIN, ProgressSink,
    ProviderPlugin, ProvisioningEngine,
};
use crate::error::Stage;
use crate::program::{Program, ProgramOptions};
use crate::progress::{self, ProgressReporter};
use crate::stack::identity::StackIdentity;
use crate::values::DeploymentSpec;

/// Everything the lifecycle needs to know about one stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub identity: StackIdentity,
    pub program: Program,
    pub plugins: Vec<ProviderPlugin>,
    pub config: Vec<(String, ConfigValue)>,
    /// Reconcile recorded state with the cloud before previewing or applying.
    pub refresh: bool,
}

impl Workflow {
    pub fn application(spec: &DeploymentSpec, options: &ProgramOptions) -> Self {
        Self {
            identity: StackIdentity::for_application(spec),
            program: Program::application(spec, options),
            plugins: vec![AWS_PLUGIN, KUBERNETES_PLUGIN, DOCKER_PLUGIN],
            config: provider_config(spec),
            refresh: false,
        }
    }

    pub fn iam_role(spec: &DeploymentSpec) -> Self {
        let identity = StackIdentity::for_iam_role(spec);
        Self {
            program: Program::iam_role(&identity),
            identity,
            plugins: vec![AWS_PLUGIN],
            config: provider_config(spec),
            refresh: true,
        }
    }
}

fn provider_config(spec: &DeploymentSpec) -> Vec<(String, ConfigValue)> {
    vec![
        (
            "aws:region".to_string(),
            ConfigValue::plain(spec.aws.region.as_str()),
        ),
        (
            "aws:skipMetadataApiCheck".to_string(),
            ConfigValue::plain("false"),
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Resolved,
    PluginsReady,
    Configured,
    Refreshed,
    Previewed,
    Applied,
    Done,
    /// Absorbing. Carries the stage that failed.
    Failed(String),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => f.write_str("uninitialized"),
            LifecycleState::Resolved => f.write_str("resolved"),
            LifecycleState::PluginsReady => f.write_str("plugins ready"),
            LifecycleState::Configured => f.write_str("configured"),
            LifecycleState::Refreshed => f.write_str("refreshed"),
            LifecycleState::Previewed => f.write_str("previewed"),
            LifecycleState::Applied => f.write_str("applied"),
            LifecycleState::Done => f.write_str("done"),
            LifecycleState::Failed(stage) => write!(f, "failed at {stage}"),
        }
    }
}

/// How an apply is watched.
pub enum Observation<R> {
    /// Engine output goes to the writer untouched.
    Verbose(Box<dyn Write + Send>),
    /// Engine events are classified and handed to the reporter.
    Classified(R),
}

pub enum RunMode<R> {
    /// Dry run, output goes to the writer.
    Preview(Box<dyn Write + Send>),
    Apply(Observation<R>),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{stage} failed for stack {stack}: {source}")]
    Engine {
        stage: Stage,
        stack: String,
        #[source]
        source: EngineError,
    },
    #[error("{stage} is not possible while the stack is {state}")]
    OutOfOrder { stage: Stage, state: LifecycleState },
    #[error("progress reporting stopped unexpectedly: {0}")]
    Pipeline(#[from] tokio::task::JoinError),
}

pub struct StackLifecycle {
    engine: Arc<dyn ProvisioningEngine>,
    workflow: Workflow,
    state: LifecycleState,
}

impl StackLifecycle {
    pub fn new(engine: Arc<dyn ProvisioningEngine>, workflow: Workflow) -> Self {
        Self {
            engine,
            workflow,
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn identity(&self) -> &StackIdentity {
        &self.workflow.identity
    }

    /// Create the stack, or select it when it already exists.
    pub async fn resolve(&mut self) -> Result<(), LifecycleError> {
        self.check(
            Stage::ResolveStack,
            matches!(self.state, LifecycleState::Uninitialized),
        )?;
        log::info!("Selecting stack {}", self.workflow.identity);
        let result = self
            .engine
            .upsert_stack(&self.workflow.identity, &Program::empty())
            .await;
        self.settle(Stage::ResolveStack, result, LifecycleState::Resolved)
    }

    pub async fn ensure_plugins(&mut self) -> Result<(), LifecycleError> {
        self.check(
            Stage::PluginInstall,
            matches!(self.state, LifecycleState::Resolved),
        )?;
        let result = self.install_plugins().await;
        self.settle(Stage::PluginInstall, result, LifecycleState::PluginsReady)
    }

    async fn install_plugins(&self) -> Result<(), EngineError> {
        for plugin in &self.workflow.plugins {
            log::debug!("Installing plugin {plugin}");
            self.engine.install_plugin(plugin).await?;
        }
        Ok(())
    }

    /// Set the provider configuration, then attach the program.
    pub async fn configure(&mut self) -> Result<(), LifecycleError> {
        self.check(
            Stage::Configure,
            matches!(self.state, LifecycleState::PluginsReady),
        )?;
        let result = self.apply_config().await;
        self.settle(Stage::Configure, result, LifecycleState::Configured)
    }

    async fn apply_config(&self) -> Result<(), EngineError> {
        for (key, value) in &self.workflow.config {
            log::debug!("Setting {key} on {}", self.workflow.identity);
            self.engine
                .set_config(&self.workflow.identity, key, value)
                .await?;
        }
        self.engine.set_program(&self.workflow.program).await
    }

    pub async fn refresh(&mut self) -> Result<(), LifecycleError> {
        self.check(
            Stage::Refresh,
            matches!(self.state, LifecycleState::Configured),
        )?;
        log::info!("Refreshing stack {}", self.workflow.identity);
        let result = self.engine.refresh(&self.workflow.identity).await;
        self.settle(Stage::Refresh, result, LifecycleState::Refreshed)
    }

    pub async fn preview(&mut self, out: Box<dyn Write + Send>) -> Result<(), LifecycleError> {
        self.check(Stage::Preview, self.ready_to_run())?;
        log::info!("Running dry run for {}", self.workflow.identity);
        let result = self.engine.preview(&self.workflow.identity, out).await;
        self.settle(Stage::Preview, result, LifecycleState::Previewed)
    }

    /// Apply the program. A classified apply hands its reporter back once
    /// every event has gone through it.
    pub async fn apply<R>(
        &mut self,
        observation: Observation<R>,
    ) -> Result<Option<R>, LifecycleError>
    where
        R: ProgressReporter + 'static,
    {
        self.check(Stage::Apply, self.ready_to_run())?;
        log::info!("Deploying {}", self.workflow.identity);
        match observation {
            Observation::Verbose(out) => {
                let result = self
                    .engine
                    .apply(&self.workflow.identity, ProgressSink::Stream(out))
                    .await;
                self.settle(Stage::Apply, result, LifecycleState::Applied)?;
                Ok(None)
            }
            Observation::Classified(reporter) => {
                let (tx, rx) = unbounded_channel();
                let pipeline = tokio::spawn(progress::classify_events(rx, reporter));
                // The sender is dropped when the call returns, which ends the pipeline.
                let result = self
                    .engine
                    .apply(&self.workflow.identity, ProgressSink::Events(tx))
                    .await;
                let joined = pipeline.await;
                self.settle(Stage::Apply, result, LifecycleState::Applied)?;
                match joined {
                    Ok(reporter) => Ok(Some(reporter)),
                    Err(err) => {
                        self.state = LifecycleState::Failed(Stage::Apply.to_string());
                        Err(LifecycleError::Pipeline(err))
                    }
                }
            }
        }
    }

    pub fn finish(&mut self) -> Result<(), LifecycleError> {
        // Finishing is not an engine call; reuse the stage of the last step.
        let stage = match self.state {
            LifecycleState::Previewed => Stage::Preview,
            _ => Stage::Apply,
        };
        self.check(
            stage,
            matches!(
                self.state,
                LifecycleState::Previewed | LifecycleState::Applied
            ),
        )?;
        log::debug!("Finished with {}", self.workflow.identity);
        self.state = LifecycleState::Done;
        Ok(())
    }

    /// Drive the whole sequence from an uninitialized stack to done.
    pub async fn run<R>(&mut self, mode: RunMode<R>) -> Result<Option<R>, LifecycleError>
    where
        R: ProgressReporter + 'static,
    {
        self.resolve().await?;
        self.ensure_plugins().await?;
        self.configure().await?;
        if self.workflow.refresh {
            self.refresh().await?;
        }
        let reporter = match mode {
            RunMode::Preview(out) => {
                self.preview(out).await?;
                None
            }
            RunMode::Apply(observation) => self.apply(observation).await?,
        };
        self.finish()?;
        Ok(reporter)
    }

    fn ready_to_run(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Configured | LifecycleState::Refreshed
        )
    }

    fn check(&self, stage: Stage, allowed: bool) -> Result<(), LifecycleError> {
        if allowed {
            Ok(())
        } else {
            Err(LifecycleError::OutOfOrder {
                stage,
                state: self.state.clone(),
            })
        }
    }

    fn settle<T>(
        &mut self,
        stage: Stage,
        result: Result<T, EngineError>,
        next: LifecycleState,
    ) -> Result<T, LifecycleError> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(source) => {
                log::error!("{stage} failed for {}", self.workflow.identity);
                self.state = LifecycleState::Failed(stage.to_string());
                Err(LifecycleError::Engine {
                    stage,
                    stack: self.workflow.identity.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineEvent;
    use crate::engine::OutputMap;
    use crate::engine::fake::{Call, FakeEngine, Op, SharedBuffer};
    use crate::progress::{LogReporter, Phase, ProgressEntry};
    use crate::values::AwsResources;

    fn spec() -> DeploymentSpec {
        DeploymentSpec {
            slug: "api".to_string(),
            org: "acme".to_string(),
            aws: AwsResources {
                region: "eu-west-1".to_string(),
                iam_role: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn lifecycle(engine: &Arc<FakeEngine>, workflow: Workflow) -> StackLifecycle {
        StackLifecycle::new(engine.clone(), workflow)
    }

    fn application() -> Workflow {
        Workflow::application(&spec(), &ProgramOptions::default())
    }

    fn deployment_events() -> Vec<EngineEvent> {
        let resource_type = "kubernetes:apps/v1:Deployment".to_string();
        let urn = "urn:pulumi:api::fh::kubernetes:apps/v1:Deployment::webDeployment".to_string();
        vec![
            EngineEvent::ResourcePre {
                resource_type: resource_type.clone(),
                urn: urn.clone(),
                op: "create".to_string(),
            },
            EngineEvent::Other,
            EngineEvent::ResourceOutputs {
                resource_type,
                urn,
                op: "create".to_string(),
                outputs: OutputMap::new(),
            },
        ]
    }

    #[test]
    fn test_application_workflow() {
        let workflow = application();
        assert_eq!(workflow.identity.to_string(), "acme/fh/api");
        assert_eq!(
            workflow.plugins,
            vec![AWS_PLUGIN, KUBERNETES_PLUGIN, DOCKER_PLUGIN]
        );
        assert_eq!(
            workflow.config,
            vec![
                ("aws:region".to_string(), ConfigValue::plain("eu-west-1")),
                (
                    "aws:skipMetadataApiCheck".to_string(),
                    ConfigValue::plain("false")
                ),
            ]
        );
        assert!(!workflow.refresh);
    }

    #[test]
    fn test_iam_role_workflow() {
        let workflow = Workflow::iam_role(&spec());
        assert_eq!(workflow.identity.to_string(), "acme/fh/api-iam-role");
        assert_eq!(workflow.plugins, vec![AWS_PLUGIN]);
        assert!(workflow.refresh);
        assert!(workflow.program.resources().contains_key("role"));
    }

    #[tokio::test]
    async fn test_dry_run_previews_and_never_applies() {
        let engine = Arc::new(FakeEngine::new().with_progress_text("+ 4 to create\n"));
        let out = SharedBuffer::default();
        let mut stack = lifecycle(&engine, application());

        let reporter = stack
            .run::<LogReporter>(RunMode::Preview(Box::new(out.clone())))
            .await
            .unwrap();

        assert!(reporter.is_none());
        assert_eq!(stack.state(), &LifecycleState::Done);
        assert_eq!(out.contents(), "+ 4 to create\n");
        assert_eq!(
            engine.ops(),
            vec![
                Op::UpsertStack,
                Op::InstallPlugin,
                Op::InstallPlugin,
                Op::InstallPlugin,
                Op::SetConfig,
                Op::SetConfig,
                Op::SetProgram,
                Op::Preview,
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_runs_when_requested() {
        let engine = Arc::new(FakeEngine::new());
        let mut stack = lifecycle(&engine, Workflow::iam_role(&spec()));

        stack
            .run(RunMode::Apply(Observation::Classified(Vec::<ProgressEntry>::new())))
            .await
            .unwrap();

        let calls = engine.calls();
        assert_eq!(calls[0], Call::UpsertStack("acme/fh/api-iam-role".to_string()));
        assert_eq!(calls[1], Call::InstallPlugin("aws".to_string()));
        let refresh = calls
            .iter()
            .position(|c| c.op() == Op::Refresh)
            .unwrap();
        let apply = calls.iter().position(|c| c.op() == Op::Apply).unwrap();
        assert!(refresh < apply);
    }

    #[tokio::test]
    async fn test_classified_apply_reports_in_order() {
        let engine = Arc::new(FakeEngine::new().with_events(deployment_events()));
        let mut stack = lifecycle(&engine, application());

        let entries = stack
            .run(RunMode::Apply(Observation::Classified(Vec::<ProgressEntry>::new())))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phase, Phase::Creating);
        assert_eq!(entries[1].phase, Phase::Created);
        assert!(!engine.ops().contains(&Op::Refresh));
        assert!(engine.calls().contains(&Call::Apply {
            stack: "acme/fh/api".to_string(),
            streamed: false,
        }));
    }

    #[tokio::test]
    async fn test_verbose_apply_streams_output() {
        let engine = Arc::new(FakeEngine::new().with_progress_text("Updating (acme/api)\n"));
        let out = SharedBuffer::default();
        let mut stack = lifecycle(&engine, application());

        let reporter = stack
            .run::<LogReporter>(RunMode::Apply(Observation::Verbose(Box::new(out.clone()))))
            .await
            .unwrap();

        assert!(reporter.is_none());
        assert_eq!(out.contents(), "Updating (acme/api)\n");
        assert!(engine.calls().contains(&Call::Apply {
            stack: "acme/fh/api".to_string(),
            streamed: true,
        }));
    }

    #[tokio::test]
    async fn test_failed_apply_still_joins_pipeline() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_events(deployment_events())
                .failing_on(Op::Apply),
        );
        let mut stack = lifecycle(&engine, application());

        let res = stack
            .run(RunMode::Apply(Observation::Classified(Vec::<ProgressEntry>::new())))
            .await;

        assert!(
            matches!(
                res,
                Err(LifecycleError::Engine {
                    stage: Stage::Apply,
                    ..
                })
            ),
            "{:?}",
            res.err()
        );
        assert_eq!(stack.state(), &LifecycleState::Failed("apply".to_string()));
    }

    #[tokio::test]
    async fn test_failure_is_absorbing() {
        let engine = Arc::new(FakeEngine::new().failing_on(Op::InstallPlugin));
        let mut stack = lifecycle(&engine, application());

        stack.resolve().await.unwrap();
        let res = stack.ensure_plugins().await;
        assert!(
            matches!(
                res,
                Err(LifecycleError::Engine {
                    stage: Stage::PluginInstall,
                    ..
                })
            ),
            "{:?}",
            res
        );
        let calls_after_failure = engine.calls().len();

        let res = stack.configure().await;
        assert!(
            matches!(res, Err(LifecycleError::OutOfOrder { .. })),
            "{:?}",
            res
        );
        assert_eq!(engine.calls().len(), calls_after_failure);
        assert_eq!(
            stack.state(),
            &LifecycleState::Failed("plugin install".to_string())
        );
    }

    #[tokio::test]
    async fn test_out_of_order_makes_no_engine_call() {
        let engine = Arc::new(FakeEngine::new());
        let mut stack = lifecycle(&engine, application());

        let res = stack.preview(Box::new(SharedBuffer::default())).await;
        assert!(
            matches!(
                res,
                Err(LifecycleError::OutOfOrder {
                    stage: Stage::Preview,
                    state: LifecycleState::Uninitialized
                })
            ),
            "{:?}",
            res
        );
        assert!(stack.finish().is_err());
        assert!(engine.calls().is_empty());
        assert_eq!(stack.state(), &LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_error_names_stage_and_stack() {
        let engine = Arc::new(FakeEngine::new().failing_on(Op::UpsertStack));
        let mut stack = lifecycle(&engine, application());

        let err = stack.resolve().await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("resolve stack failed for stack acme/fh/api"), "{message}");
    }
}
