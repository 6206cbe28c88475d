//! Inline deployment programs.
//!
//! A program is a Pulumi YAML project document. The engine attaches it to
//! the stack's workspace before running preview or apply, so the resources
//! it declares only resolve once the matching provider plugins are
//! installed.

use serde::Serialize;
use serde_json::{Value, json};
use std::{collections::BTreeMap, path::PathBuf};

use crate::stack::identity::{PROJECT, StackIdentity};
use crate::values::{DeployUnit, DeploymentSpec, Port};

/// Annotation asking the AWS cloud controller for a network load balancer.
const NLB_ANNOTATION: &str = "service.beta.kubernetes.io/aws-load-balancer-type";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Program {
    name: String,
    runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    variables: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    resources: BTreeMap<String, Resource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub properties: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ResourceOptions>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOptions {
    pub depends_on: Vec<String>,
}

/// Options of the `up` command that shape the application program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Docker build context of the application image.
    pub directory: PathBuf,
    /// Provision a network load balancer instead of a classic one.
    pub nlb: bool,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            nlb: false,
        }
    }
}

impl Program {
    /// A program without resources, used while a stack is being selected.
    pub fn empty() -> Self {
        Self {
            name: PROJECT.to_string(),
            runtime: "yaml".to_string(),
            description: None,
            variables: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// The application: image repository, image build, namespace and one
    /// deployment plus services per deployment unit, along with the optional
    /// S3 bucket and SQS queues.
    pub fn application(spec: &DeploymentSpec, options: &ProgramOptions) -> Self {
        let mut program = Self::empty();
        program.description = Some(format!("fh application {}", spec.display_name()));

        program.resource(
            "repository",
            "aws:ecr:Repository",
            json!({ "name": spec.slug, "forceDelete": true }),
        );
        program.variables.insert(
            "registryAuth".to_string(),
            json!({
                "fn::invoke": {
                    "function": "aws:ecr:getAuthorizationToken",
                    "arguments": { "registryId": "${repository.registryId}" },
                }
            }),
        );
        program.resource(
            "image",
            "docker:Image",
            json!({
                "imageName": "${repository.repositoryUrl}:latest",
                "build": {
                    "context": options.directory.to_string_lossy(),
                    "platform": "linux/amd64",
                },
                "registry": {
                    "server": "${repository.repositoryUrl}",
                    "username": "${registryAuth.userName}",
                    "password": "${registryAuth.password}",
                },
            }),
        );
        program.resource(
            "namespace",
            "kubernetes:core/v1:Namespace",
            json!({ "metadata": { "name": spec.namespace() } }),
        );

        let mut address = None;
        for (unit_name, unit) in &spec.deploy {
            program.deploy_unit(unit_name, unit);
            for service in &unit.services {
                let logical = program.service(unit_name, unit, service, options.nlb);
                if unit.is_public() && address.is_none() {
                    address = Some(logical);
                }
            }
        }

        if let Some(bucket) = spec.aws.s3_bucket.as_ref().filter(|bucket| bucket.create) {
            let name = if bucket.name.is_empty() {
                format!("fh-{}", spec.slug)
            } else {
                bucket.name.clone()
            };
            program.resource("bucket", "aws:s3:BucketV2", json!({ "bucket": name }));
            if bucket.encrypt {
                program.resource(
                    "bucketEncryption",
                    "aws:s3:BucketServerSideEncryptionConfigurationV2",
                    json!({
                        "bucket": "${bucket.id}",
                        "rules": [{
                            "applyServerSideEncryptionByDefault": { "sseAlgorithm": "AES256" }
                        }],
                    }),
                );
            }
            program
                .outputs
                .insert("bucketName".to_string(), "${bucket.bucket}".to_string());
        }

        for queue in &spec.aws.sqs {
            program.resource(
                &logical_name(&[&queue.name, "queue"]),
                "aws:sqs:Queue",
                json!({ "name": format!("{}-{}", spec.slug, queue.name) }),
            );
        }

        program.outputs.insert(
            "repositoryUrl".to_string(),
            "${repository.repositoryUrl}".to_string(),
        );
        if let Some(service) = address {
            program.outputs.insert(
                "address".to_string(),
                format!("${{{service}.status.loadBalancer.ingress[0].hostname}}"),
            );
        }
        program
    }

    /// An IAM role the application can assume from its pods.
    pub fn iam_role(stack: &StackIdentity) -> Self {
        let mut program = Self::empty();
        program.description = Some(format!("IAM role for {}", stack.name()));
        let assume_role_policy = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": "pods.eks.amazonaws.com" },
                "Action": ["sts:AssumeRole", "sts:TagSession"],
            }],
        });
        program.resource(
            "role",
            "aws:iam:Role",
            json!({
                "name": format!("fh-{}", stack.name()),
                "description": format!("IAM Role for {}", stack.name()),
                "assumeRolePolicy": assume_role_policy.to_string(),
                "tags": { "stack": format!("{}/{}", stack.project(), stack.name()) },
            }),
        );
        program
            .outputs
            .insert("iamRole".to_string(), "${role.arn}".to_string());
        program
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    fn resource(&mut self, name: &str, resource_type: &str, properties: Value) {
        self.resources.insert(
            name.to_string(),
            Resource {
                resource_type: resource_type.to_string(),
                properties,
                options: None,
            },
        );
    }

    fn deploy_unit(&mut self, unit_name: &str, unit: &DeployUnit) {
        let labels = json!({ "app": unit_name });
        let env: Vec<Value> = unit
            .env_vars
            .iter()
            .map(|var| json!({ "name": var.name, "value": var.value }))
            .collect();
        let ports: Vec<Value> = unit
            .ports
            .iter()
            .map(|port| json!({ "name": port.name, "containerPort": port.number }))
            .collect();

        let mut container = json!({
            "name": unit_name,
            "image": "${image.repoDigest}",
            "env": env,
            "ports": ports,
        });
        let mut resources = serde_json::Map::new();
        if !unit.resources.requests.is_empty() {
            resources.insert("requests".to_string(), json!(unit.resources.requests));
        }
        if !unit.resources.limits.is_empty() {
            resources.insert("limits".to_string(), json!(unit.resources.limits));
        }
        if !resources.is_empty() {
            container["resources"] = Value::Object(resources);
        }

        self.resource(
            &logical_name(&[unit_name, "deployment"]),
            "kubernetes:apps/v1:Deployment",
            json!({
                "metadata": {
                    "name": unit_name,
                    "namespace": "${namespace.metadata.name}",
                    "labels": labels,
                },
                "spec": {
                    "replicas": 1,
                    "selector": { "matchLabels": labels },
                    "template": {
                        "metadata": { "labels": labels },
                        "spec": { "containers": [container] },
                    },
                },
            }),
        );
    }

    /// Adds the service and returns its logical name.
    fn service(
        &mut self,
        unit_name: &str,
        unit: &DeployUnit,
        service: &crate::values::Service,
        nlb: bool,
    ) -> String {
        let logical = logical_name(&[unit_name, &service.name, "service"]);
        let public = unit.is_public();
        let mut metadata = json!({
            "name": service.name,
            "namespace": "${namespace.metadata.name}",
            "labels": { "app": unit_name },
        });
        if public && nlb {
            metadata["annotations"] = json!({ NLB_ANNOTATION: "nlb" });
        }
        let service_type = if public { "LoadBalancer" } else { "ClusterIP" };
        let ports: Vec<Value> = service.ports.iter().map(service_port).collect();
        self.resource(
            &logical,
            "kubernetes:core/v1:Service",
            json!({
                "metadata": metadata,
                "spec": {
                    "type": service_type,
                    "selector": { "app": unit_name },
                    "ports": ports,
                },
            }),
        );
        if let Some(resource) = self.resources.get_mut(&logical) {
            resource.options = Some(ResourceOptions {
                depends_on: vec![format!("${{{}}}", logical_name(&[unit_name, "deployment"]))],
            });
        }
        logical
    }
}

fn service_port(port: &Port) -> Value {
    json!({ "name": port.name, "port": port.number, "targetPort": port.number })
}

/// Joins `parts` into a camel cased identifier usable in `${...}` references.
fn logical_name(parts: &[&str]) -> String {
    let mut name = String::new();
    for part in parts {
        for word in part.split(|c: char| !c.is_ascii_alphanumeric()) {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                if name.is_empty() {
                    name.push(first.to_ascii_lowercase());
                } else {
                    name.push(first.to_ascii_uppercase());
                }
                name.extend(chars);
            }
        }
    }
    name
}
