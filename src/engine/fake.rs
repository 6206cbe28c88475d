//! In-memory engine recording every call, for tests.

use std::{collections::HashMap, io::Write, sync::Mutex};

use async_trait::async_trait;

use super::{
    ConfigValue, DestroyOptions, EngineError, EngineEvent, OutputMap, ProgressSink,
    ProviderPlugin, ProvisioningEngine, StackSummary,
};
use crate::program::Program;
use crate::stack::identity::StackIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    UpsertStack,
    SelectStack,
    InstallPlugin,
    SetConfig,
    SetProgram,
    Refresh,
    Preview,
    Apply,
    ListStacks,
    Outputs,
    Destroy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    UpsertStack(String),
    SelectStack(String),
    InstallPlugin(String),
    SetConfig {
        stack: String,
        key: String,
        value: String,
    },
    SetProgram(Program),
    Refresh(String),
    Preview(String),
    Apply {
        stack: String,
        streamed: bool,
    },
    ListStacks {
        org: String,
        project: String,
    },
    Outputs(String),
    Destroy {
        stack: String,
        preview_only: bool,
    },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::UpsertStack(_) => Op::UpsertStack,
            Call::SelectStack(_) => Op::SelectStack,
            Call::InstallPlugin(_) => Op::InstallPlugin,
            Call::SetConfig { .. } => Op::SetConfig,
            Call::SetProgram(_) => Op::SetProgram,
            Call::Refresh(_) => Op::Refresh,
            Call::Preview(_) => Op::Preview,
            Call::Apply { .. } => Op::Apply,
            Call::ListStacks { .. } => Op::ListStacks,
            Call::Outputs(_) => Op::Outputs,
            Call::Destroy { .. } => Op::Destroy,
        }
    }
}

#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    fail_on: Option<Op>,
    events: Vec<EngineEvent>,
    progress_text: String,
    stacks: Vec<StackSummary>,
    outputs: HashMap<String, OutputMap>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, op: Op) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Events emitted on the channel during apply.
    pub fn with_events(mut self, events: Vec<EngineEvent>) -> Self {
        self.events = events;
        self
    }

    /// Text written to the output stream by preview, apply and destroy.
    pub fn with_progress_text(mut self, text: &str) -> Self {
        self.progress_text = text.to_string();
        self
    }

    pub fn with_stack(mut self, stack: StackSummary, outputs: OutputMap) -> Self {
        self.outputs.insert(stack.name.clone(), outputs);
        self.stacks.push(stack);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("poisoned").clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().iter().map(Call::op).collect()
    }

    fn record(&self, call: Call) -> Result<(), EngineError> {
        let op = call.op();
        self.calls.lock().expect("poisoned").push(call);
        match self.fail_on {
            Some(fail) if fail == op => Err(EngineError::CommandFailed {
                command: format!("{op:?}"),
                status: "exit status: 1".to_string(),
                output: "scripted failure".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn write_progress(&self, mut out: Box<dyn Write + Send>) -> Result<(), EngineError> {
        out.write_all(self.progress_text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl ProvisioningEngine for FakeEngine {
    async fn upsert_stack(
        &self,
        stack: &StackIdentity,
        _program: &Program,
    ) -> Result<(), EngineError> {
        self.record(Call::UpsertStack(stack.to_string()))
    }

    async fn select_stack(&self, stack: &StackIdentity) -> Result<(), EngineError> {
        self.record(Call::SelectStack(stack.to_string()))
    }

    async fn install_plugin(&self, plugin: &ProviderPlugin) -> Result<(), EngineError> {
        self.record(Call::InstallPlugin(plugin.name.to_string()))
    }

    async fn set_config(
        &self,
        stack: &StackIdentity,
        key: &str,
        value: &ConfigValue,
    ) -> Result<(), EngineError> {
        self.record(Call::SetConfig {
            stack: stack.to_string(),
            key: key.to_string(),
            value: value.value.clone(),
        })
    }

    async fn set_program(&self, program: &Program) -> Result<(), EngineError> {
        self.record(Call::SetProgram(program.clone()))
    }

    async fn refresh(&self, stack: &StackIdentity) -> Result<(), EngineError> {
        self.record(Call::Refresh(stack.to_string()))
    }

    async fn preview(
        &self,
        stack: &StackIdentity,
        out: Box<dyn Write + Send>,
    ) -> Result<(), EngineError> {
        self.write_progress(out)?;
        self.record(Call::Preview(stack.to_string()))
    }

    async fn apply(&self, stack: &StackIdentity, sink: ProgressSink) -> Result<(), EngineError> {
        let streamed = matches!(sink, ProgressSink::Stream(_));
        match sink {
            ProgressSink::Stream(out) => self.write_progress(out)?,
            ProgressSink::Events(tx) => {
                for event in &self.events {
                    let _ = tx.send(event.clone());
                }
            }
        }
        self.record(Call::Apply {
            stack: stack.to_string(),
            streamed,
        })
    }

    async fn list_stacks(
        &self,
        org: &str,
        project: &str,
    ) -> Result<Vec<StackSummary>, EngineError> {
        self.record(Call::ListStacks {
            org: org.to_string(),
            project: project.to_string(),
        })?;
        Ok(self.stacks.clone())
    }

    async fn outputs(&self, stack: &StackIdentity) -> Result<OutputMap, EngineError> {
        self.record(Call::Outputs(stack.to_string()))?;
        let outputs = self
            .stacks
            .iter()
            .find(|summary| summary.short_name() == stack.name())
            .and_then(|summary| self.outputs.get(&summary.name))
            .cloned()
            .unwrap_or_default();
        Ok(outputs)
    }

    async fn destroy(
        &self,
        stack: &StackIdentity,
        options: DestroyOptions,
        out: Box<dyn Write + Send>,
    ) -> Result<(), EngineError> {
        self.write_progress(out)?;
        self.record(Call::Destroy {
            stack: stack.to_string(),
            preview_only: options.preview_only,
        })
    }
}

/// Cloneable in-memory writer standing in for stdout.
#[derive(Clone, Default)]
pub struct SharedBuffer(std::sync::Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("poisoned")).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
