//! Turns the engine's event stream into progress an operator can follow.
//!
//! The engine reports every step it takes, most of which is noise to a
//! person watching a deployment. Only resource types present in
//! [`RESOURCE_LABELS`] are reported; everything else is dropped.

use std::{collections::HashMap, sync::OnceLock};

use log::Level;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::engine::EngineEvent;

/// How a resource type is presented while it is being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLabel {
    pub resource_type: &'static str,
    pub label: &'static str,
    pub level: Level,
    /// Output worth showing once the resource exists.
    pub notable_output: Option<&'static str>,
}

pub const RESOURCE_LABELS: &[ResourceLabel] = &[
    ResourceLabel {
        resource_type: "aws:ecr/repository:Repository",
        label: "ECR repository",
        level: Level::Info,
        notable_output: Some("repositoryUrl"),
    },
    ResourceLabel {
        resource_type: "kubernetes:core/v1:Namespace",
        label: "Kubernetes Namespace",
        level: Level::Info,
        notable_output: None,
    },
    ResourceLabel {
        resource_type: "kubernetes:core/v1:Service",
        label: "Kubernetes Service",
        level: Level::Info,
        notable_output: None,
    },
    ResourceLabel {
        resource_type: "kubernetes:apps/v1:Deployment",
        label: "Kubernetes Deployment",
        level: Level::Info,
        notable_output: None,
    },
    ResourceLabel {
        resource_type: "aws:iam/role:Role",
        label: "IAM role",
        level: Level::Info,
        notable_output: Some("arn"),
    },
    ResourceLabel {
        resource_type: "aws:s3/bucketV2:BucketV2",
        label: "S3 bucket",
        level: Level::Info,
        notable_output: Some("bucket"),
    },
    ResourceLabel {
        resource_type: "aws:sqs/queue:Queue",
        label: "SQS queue",
        level: Level::Info,
        notable_output: Some("url"),
    },
    ResourceLabel {
        resource_type: "docker:index/image:Image",
        label: "container image",
        level: Level::Debug,
        notable_output: Some("imageName"),
    },
];

static LABELS: OnceLock<HashMap<&'static str, &'static ResourceLabel>> = OnceLock::new();

/// Look up the label of a resource type.
pub fn lookup(resource_type: &str) -> Option<&'static ResourceLabel> {
    LABELS
        .get_or_init(|| {
            RESOURCE_LABELS
                .iter()
                .map(|label| (label.resource_type, label))
                .collect()
        })
        .get(resource_type)
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Creating,
    Created,
}

impl Phase {
    pub fn event_tag(self) -> &'static str {
        match self {
            Phase::Creating => "CREATING",
            Phase::Created => "COMPLETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    pub phase: Phase,
    pub resource_type: String,
    pub label: &'static str,
    pub level: Level,
    /// Notable output name and its value.
    pub output: Option<(&'static str, String)>,
}

impl ProgressEntry {
    pub fn message(&self) -> String {
        match self.phase {
            Phase::Creating => format!("Creating {}", self.label),
            Phase::Created => format!("Created {}", self.label),
        }
    }
}

/// Classify a single event. `None` for anything an operator does not need to see.
pub fn classify(event: &EngineEvent) -> Option<ProgressEntry> {
    let (phase, resource_type, outputs) = match event {
        EngineEvent::ResourcePre { resource_type, .. } => (Phase::Creating, resource_type, None),
        EngineEvent::ResourceOutputs {
            resource_type,
            outputs,
            ..
        } => (Phase::Created, resource_type, Some(outputs)),
        _ => return None,
    };
    let label = lookup(resource_type)?;

    let output = match (label.notable_output, outputs) {
        (Some(key), Some(outputs)) => outputs.get(key).map(|value| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key, value)
        }),
        _ => None,
    };

    Some(ProgressEntry {
        phase,
        resource_type: resource_type.clone(),
        label: label.label,
        level: label.level,
        output,
    })
}

pub trait ProgressReporter: Send {
    fn report(&mut self, entry: ProgressEntry);
}

/// Reports progress through the logger, tagged with the phase and the
/// resource type.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&mut self, entry: ProgressEntry) {
        let event = entry.phase.event_tag();
        let resource = entry.resource_type.as_str();
        match &entry.output {
            Some((_, value)) => log::log!(
                target: "fh::progress",
                entry.level,
                event = event,
                resource = resource,
                name = value.as_str();
                "{}",
                entry.message()
            ),
            None => log::log!(
                target: "fh::progress",
                entry.level,
                event = event,
                resource = resource;
                "{}",
                entry.message()
            ),
        }
    }
}

#[cfg(test)]
impl ProgressReporter for Vec<ProgressEntry> {
    fn report(&mut self, entry: ProgressEntry) {
        self.push(entry);
    }
}

/// Consume events in arrival order until every sender is gone, then hand
/// the reporter back.
pub async fn classify_events<R: ProgressReporter>(
    mut rx: UnboundedReceiver<EngineEvent>,
    mut reporter: R,
) -> R {
    while let Some(event) = rx.recv().await {
        if let Some(entry) = classify(&event) {
            reporter.report(entry);
        }
    }
    log::debug!("Engine event stream closed");
    reporter
}
