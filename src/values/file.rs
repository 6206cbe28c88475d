use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Region used when the values file does not name one.
pub const DEFAULT_REGION: &str = "us-east-2";

/// The deployment values file, as written by the application owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeploymentSpec {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<String>,
    #[serde(default)]
    pub namespace: String,
    /// Deployment units keyed by their logical name. Sorted so that the
    /// generated program does not depend on file order.
    #[serde(default)]
    pub deploy: BTreeMap<String, DeployUnit>,
    #[serde(default)]
    pub aws: AwsResources,
}

impl DeploymentSpec {
    /// Kubernetes namespace for the application. Falls back to the slug.
    pub fn namespace(&self) -> &str {
        if self.namespace.is_empty() {
            &self.slug
        } else {
            &self.namespace
        }
    }

    /// Human facing name. Falls back to the slug.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.slug
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeployUnit {
    #[serde(default, rename = "env")]
    pub env_vars: Vec<EnvVar>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default, rename = "service")]
    pub services: Vec<Service>,
    #[serde(default)]
    pub ingress: Vec<Ingress>,
    #[serde(default)]
    pub resources: Resources,
}

impl DeployUnit {
    /// A unit is reachable from outside the cluster if any ingress rule is public.
    pub fn is_public(&self) -> bool {
        self.ingress.iter().any(|ingress| ingress.public)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub number: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ingress {
    pub host: String,
    #[serde(default)]
    pub public: bool,
}

/// Requests and limits are passed through untouched; the cluster validates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Resources {
    #[serde(default)]
    pub requests: CpuMem,
    #[serde(default)]
    pub limits: CpuMem,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CpuMem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl CpuMem {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AwsResources {
    #[serde(default, rename = "iamRole")]
    pub iam_role: bool,
    #[serde(default)]
    pub region: String,
    #[serde(default, rename = "s3Bucket", skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<S3Bucket>,
    #[serde(default)]
    pub sqs: Vec<Sqs>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct S3Bucket {
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "encrtyp")]
    pub encrypt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sqs {
    pub name: String,
}
