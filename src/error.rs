use std::fmt;

use crate::engine::EngineError;
use crate::settings::SettingsError;
use crate::stack::{InventoryError, LifecycleError, TeardownError};
use crate::values::ConfigError;

/// Step of a command at which an engine call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ConfigParse,
    ResolveStack,
    PluginInstall,
    Configure,
    Refresh,
    Preview,
    Apply,
    ListStacks,
    StackOutputs,
    Destroy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Stage::ConfigParse => "config parse",
            Stage::ResolveStack => "resolve stack",
            Stage::PluginInstall => "plugin install",
            Stage::Configure => "configure",
            Stage::Refresh => "refresh",
            Stage::Preview => "preview",
            Stage::Apply => "apply",
            Stage::ListStacks => "list stacks",
            Stage::StackOutputs => "stack outputs",
            Stage::Destroy => "destroy",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FhError {
    #[error("{stage} failed: {0}", stage = Stage::ConfigParse)]
    Config(#[from] ConfigError),
    #[error("Unable to load settings: {0}")]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Teardown(#[from] TeardownError),
    #[error("Unable to prepare engine workspace: {0}")]
    Workspace(#[from] EngineError),
    #[error("No org given, pass --org or set one in the settings file or values file")]
    MissingOrg,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
