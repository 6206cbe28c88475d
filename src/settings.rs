use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::Args;
use crate::values::Overrides;

const SETTINGS_DIR: &str = ".fh";
const SETTINGS_FILE: &str = "config.toml";
const DEFAULT_PULUMI: &str = "pulumi";

/// Per-user defaults read from `~/.fh/config.toml`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Path to the engine binary.
    #[serde(default)]
    pub pulumi: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(SETTINGS_DIR).join(SETTINGS_FILE))
}

impl SettingsFile {
    fn try_init_from_string(val: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(val)?)
    }

    /// A missing file yields the defaults.
    pub fn try_init(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                log::debug!("Loading settings from {path:?}");
                Self::try_init_from_string(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolved settings of one invocation. Flags and environment win over the
/// settings file, which wins over the values file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub values: PathBuf,
    pub org: Option<String>,
    pub region: Option<String>,
    pub pulumi: PathBuf,
}

impl Settings {
    pub fn try_init(args: &Args) -> Result<Self, SettingsError> {
        let file = match settings_path() {
            Some(path) => SettingsFile::try_init(&path)?,
            None => SettingsFile::default(),
        };
        Ok(Self::merge(args, file))
    }

    fn merge(args: &Args, file: SettingsFile) -> Self {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        Self {
            values: args.values.clone(),
            org: non_empty(&args.org).or_else(|| non_empty(&file.org)),
            region: non_empty(&args.region).or_else(|| non_empty(&file.region)),
            pulumi: file.pulumi.unwrap_or_else(|| PathBuf::from(DEFAULT_PULUMI)),
        }
    }

    /// Overrides applied on top of the values file.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            org: self.org.clone(),
            region: self.region.clone(),
        }
    }
}
