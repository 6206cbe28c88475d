//! Boundary to the infrastructure provisioning engine.
//!
//! The orchestrator only ever talks to the engine through
//! [`ProvisioningEngine`]. Stack state, diffing and the actual cloud calls
//! all live on the other side of this trait.

pub mod events;
#[cfg(test)]
pub mod fake;
pub mod pulumi;

use std::{fmt, io::Write, path::PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::program::Program;
use crate::stack::identity::StackIdentity;

pub use events::{EngineEvent, OutputMap};
pub use pulumi::PulumiCli;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unable to start {binary:?}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}): {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },
    #[error("unable to decode engine output: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unable to render program: {0}")]
    Program(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A provider plugin that has to be present in the workspace before a
/// program referencing its resource types can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderPlugin {
    pub name: &'static str,
    pub version: &'static str,
}

impl fmt::Display for ProviderPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

pub const AWS_PLUGIN: ProviderPlugin = ProviderPlugin {
    name: "aws",
    version: "v6.54.0",
};
pub const KUBERNETES_PLUGIN: ProviderPlugin = ProviderPlugin {
    name: "kubernetes",
    version: "v4.18.1",
};
pub const DOCKER_PLUGIN: ProviderPlugin = ProviderPlugin {
    name: "docker",
    version: "v4.5.5",
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub value: String,
    pub secret: bool,
}

impl ConfigValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: false,
        }
    }
}

/// One entry of the engine's stack listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSummary {
    pub name: String,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<Url>,
    #[serde(default)]
    pub update_in_progress: bool,
    #[serde(default)]
    pub resource_count: Option<u64>,
}

impl StackSummary {
    /// The stack name without org and project.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Where the engine reports progress while an apply runs.
pub enum ProgressSink {
    /// Engine output is forwarded as is.
    Stream(Box<dyn Write + Send>),
    /// Structured events are sent over the channel and textual output is
    /// kept out of the terminal. The channel closes when the sender drops.
    Events(UnboundedSender<EngineEvent>),
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressSink::Stream(_) => f.write_str("ProgressSink::Stream"),
            ProgressSink::Events(_) => f.write_str("ProgressSink::Events"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    /// Only show what would be deleted.
    pub preview_only: bool,
}

#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Create the stack if it does not exist yet, select it otherwise.
    async fn upsert_stack(&self, stack: &StackIdentity, program: &Program)
    -> Result<(), EngineError>;
    async fn select_stack(&self, stack: &StackIdentity) -> Result<(), EngineError>;
    async fn install_plugin(&self, plugin: &ProviderPlugin) -> Result<(), EngineError>;
    async fn set_config(
        &self,
        stack: &StackIdentity,
        key: &str,
        value: &ConfigValue,
    ) -> Result<(), EngineError>;
    async fn set_program(&self, program: &Program) -> Result<(), EngineError>;
    async fn refresh(&self, stack: &StackIdentity) -> Result<(), EngineError>;
    async fn preview(
        &self,
        stack: &StackIdentity,
        out: Box<dyn Write + Send>,
    ) -> Result<(), EngineError>;
    async fn apply(&self, stack: &StackIdentity, sink: ProgressSink) -> Result<(), EngineError>;
    async fn list_stacks(&self, org: &str, project: &str)
    -> Result<Vec<StackSummary>, EngineError>;
    async fn outputs(&self, stack: &StackIdentity) -> Result<OutputMap, EngineError>;
    async fn destroy(
        &self,
        stack: &StackIdentity,
        options: DestroyOptions,
        out: Box<dyn Write + Send>,
    ) -> Result<(), EngineError>;
}
