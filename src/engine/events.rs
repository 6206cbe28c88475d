//! Engine events as written by `pulumi --event-log`.
//!
//! Every line of the event log is a JSON object carrying exactly one of the
//! `*Event` fields. Only the events the orchestrator reacts to are modelled
//! in detail; the rest collapse into [`EngineEvent::Other`].

use serde::Deserialize;
use std::collections::BTreeMap;

pub type OutputMap = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Work on a resource is about to start.
    ResourcePre {
        resource_type: String,
        urn: String,
        op: String,
    },
    /// Work on a resource finished and its outputs are known.
    ResourceOutputs {
        resource_type: String,
        urn: String,
        op: String,
        outputs: OutputMap,
    },
    Diagnostic {
        severity: String,
        message: String,
    },
    Summary,
    Other,
}

impl EngineEvent {
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        let record: EventRecord = serde_json::from_str(line)?;
        Ok(record.into())
    }

    pub fn resource_type(&self) -> Option<&str> {
        match self {
            EngineEvent::ResourcePre { resource_type, .. }
            | EngineEvent::ResourceOutputs { resource_type, .. } => Some(resource_type),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    #[serde(default)]
    resource_pre_event: Option<StepEventRecord>,
    #[serde(default)]
    res_outputs_event: Option<StepEventRecord>,
    #[serde(default)]
    diagnostic_event: Option<DiagnosticRecord>,
    #[serde(default)]
    summary_event: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StepEventRecord {
    metadata: StepMetadata,
}

#[derive(Debug, Deserialize)]
struct StepMetadata {
    #[serde(default)]
    op: String,
    #[serde(default)]
    urn: String,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    new: Option<StepState>,
}

#[derive(Debug, Deserialize)]
struct StepState {
    #[serde(default)]
    outputs: OutputMap,
}

#[derive(Debug, Deserialize)]
struct DiagnosticRecord {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    message: String,
}

impl From<EventRecord> for EngineEvent {
    fn from(record: EventRecord) -> Self {
        if let Some(pre) = record.resource_pre_event {
            let meta = pre.metadata;
            return EngineEvent::ResourcePre {
                resource_type: meta.resource_type,
                urn: meta.urn,
                op: meta.op,
            };
        }
        if let Some(post) = record.res_outputs_event {
            let meta = post.metadata;
            return EngineEvent::ResourceOutputs {
                resource_type: meta.resource_type,
                urn: meta.urn,
                op: meta.op,
                outputs: meta.new.map(|state| state.outputs).unwrap_or_default(),
            };
        }
        if let Some(diag) = record.diagnostic_event {
            return EngineEvent::Diagnostic {
                severity: diag.severity,
                message: diag.message,
            };
        }
        if record.summary_event.is_some() {
            return EngineEvent::Summary;
        }
        EngineEvent::Other
    }
}
