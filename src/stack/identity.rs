use std::fmt;

use crate::values::DeploymentSpec;

/// Project every fh stack lives under.
pub const PROJECT: &str = "fh";

/// Fully qualified name of a stack: `org/fh/name`.
///
/// The identity is the idempotency key for every engine call, so the same
/// org and slug must always resolve to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackIdentity {
    org: String,
    name: String,
}

impl StackIdentity {
    pub fn new(org: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            name: name.into(),
        }
    }

    /// Stack holding the application itself.
    pub fn for_application(spec: &DeploymentSpec) -> Self {
        Self::new(&spec.org, &spec.slug)
    }

    /// Stack holding the application's IAM role.
    pub fn for_iam_role(spec: &DeploymentSpec) -> Self {
        Self::new(&spec.org, format!("{}-iam-role", spec.slug))
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn project(&self) -> &str {
        PROJECT
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fully_qualified(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org, PROJECT, self.name)
    }
}
