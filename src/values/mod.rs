//! Deployment values file.
//!
//! The values file is a YAML document describing the application: its slug,
//! the organization owning the stack state, the deployment units that end up
//! as Kubernetes workloads and the AWS resources the application needs.
//!
//! ```yaml
//! name: My API
//! slug: api
//! org: acme
//! deploy:
//!   web:
//!     env:
//!       - name: RUST_LOG
//!         value: info
//!     ports:
//!       - name: http
//!         number: 8080
//! aws:
//!   region: eu-west-1
//! ```

pub mod file;

use std::path::{Path, PathBuf};

pub use file::{
    AwsResources, CpuMem, DEFAULT_REGION, DeployUnit, DeploymentSpec, EnvVar, Ingress, Port,
    Resources, S3Bucket, Service, Sqs,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read values file {path:?}: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed values file: {0}")]
    MalformedSpec(#[from] serde_yaml::Error),
    #[error("missing org in values file")]
    MissingOrg,
    #[error("missing slug in values file")]
    MissingSlug,
}

/// Values that take precedence over the values file, coming from
/// command line flags, the environment or the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub org: Option<String>,
    pub region: Option<String>,
}

/// Read and validate the values file at `path`.
pub fn parse(path: impl AsRef<Path>) -> Result<DeploymentSpec, ConfigError> {
    parse_with(path, &Overrides::default())
}

/// Read the values file at `path`, apply `overrides` and validate the result.
pub fn parse_with(
    path: impl AsRef<Path>,
    overrides: &Overrides,
) -> Result<DeploymentSpec, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read(path).map_err(|source| ConfigError::ReadFailure {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Parsing values file {path:?}");
    parse_bytes(&raw, overrides)
}

fn parse_bytes(raw: &[u8], overrides: &Overrides) -> Result<DeploymentSpec, ConfigError> {
    let spec: DeploymentSpec = serde_yaml::from_slice(raw)?;
    finalize(spec, overrides)
}

/// Single post-parse pass: overrides, then validation, then defaults.
fn finalize(mut spec: DeploymentSpec, overrides: &Overrides) -> Result<DeploymentSpec, ConfigError> {
    if let Some(org) = overrides.org.as_ref().filter(|org| !org.trim().is_empty()) {
        spec.org = org.clone();
    }
    if let Some(region) = overrides.region.as_ref().filter(|region| !region.trim().is_empty()) {
        spec.aws.region = region.clone();
    }

    // The org decides where stack state lives, it can never be guessed.
    if spec.org.trim().is_empty() {
        return Err(ConfigError::MissingOrg);
    }
    if spec.slug.trim().is_empty() {
        return Err(ConfigError::MissingSlug);
    }

    if spec.aws.region.trim().is_empty() {
        spec.aws.region = DEFAULT_REGION.to_string();
    }

    Ok(spec)
}
