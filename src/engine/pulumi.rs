//! [`ProvisioningEngine`] backed by the `pulumi` command line.
//!
//! Every call runs the CLI inside a private workspace directory holding the
//! project file (`Pulumi.yaml`). The inline program is attached by
//! rewriting that file. While `up` runs with an event channel, the CLI
//! writes its engine events to a JSON-lines log which is tailed and
//! forwarded to the channel until the process exits.

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader},
    process::Command,
    sync::mpsc::UnboundedSender,
};

use super::{
    ConfigValue, DestroyOptions, EngineError, EngineEvent, OutputMap, ProgressSink,
    ProviderPlugin, ProvisioningEngine, StackSummary,
};
use crate::program::Program;
use crate::stack::identity::StackIdentity;

const PROJECT_FILE: &str = "Pulumi.yaml";
const TAIL_INTERVAL: Duration = Duration::from_millis(200);

pub struct PulumiCli {
    binary: PathBuf,
    workspace: TempDir,
}

impl PulumiCli {
    /// Prepare a fresh workspace holding an empty program.
    pub async fn new(binary: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let workspace = tempfile::Builder::new().prefix("fh-workspace-").tempdir()?;
        let cli = Self {
            binary: binary.into(),
            workspace,
        };
        cli.write_program(&Program::empty()).await?;
        log::debug!("Using pulumi workspace {:?}", cli.work_dir());
        Ok(cli)
    }

    pub fn work_dir(&self) -> &Path {
        self.workspace.path()
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.binary);
        // Global flags go first, the call's own arguments may end with `--`.
        command
            .arg("--non-interactive")
            .args(args)
            .current_dir(self.work_dir())
            .env("PULUMI_SKIP_UPDATE_CHECK", "true")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Spawn {
            binary: self.binary.clone(),
            source,
        }
    }

    /// Run to completion and return stdout.
    async fn run(&self, args: &[&str]) -> Result<String, EngineError> {
        log::debug!("Running pulumi {}", args.join(" "));
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(command_failed(
                args,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run to completion copying stdout to `out` as it is produced.
    /// Stderr goes straight to the terminal.
    async fn stream(&self, args: &[&str], mut out: Box<dyn Write + Send>) -> Result<(), EngineError> {
        log::debug!("Running pulumi {}", args.join(" "));
        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdout) = child.stdout.take() {
            let mut buf = vec![0u8; 8192];
            loop {
                let read = stdout.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                out.write_all(&buf[..read])?;
                out.flush()?;
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(command_failed(args, status, "see engine output above"));
        }
        Ok(())
    }

    /// Run to completion forwarding the engine events to `tx`. Console
    /// output is captured and only surfaced when the command fails.
    async fn with_event_log(
        &self,
        args: &[&str],
        tx: UnboundedSender<EngineEvent>,
    ) -> Result<(), EngineError> {
        let event_log = tempfile::Builder::new()
            .prefix("events-")
            .suffix(".jsonl")
            .tempfile_in(self.work_dir())?;
        let mut tail = EventLogTail::open(event_log.path()).await?;

        log::debug!("Running pulumi {}", args.join(" "));
        let mut child = self
            .command(args)
            .arg("--event-log")
            .arg(event_log.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        let stdout = tokio::spawn(read_to_string(child.stdout.take()));
        let stderr = tokio::spawn(read_to_string(child.stderr.take()));

        // Once started, the update runs to its end. Tail errors only cost events.
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = tokio::time::sleep(TAIL_INTERVAL) => forward(&mut tail, &tx).await,
            }
        };
        // The process is gone, whatever is left in the log is final.
        forward(&mut tail, &tx).await;

        if !status.success() {
            let stdout = stdout.await.unwrap_or_default();
            let stderr = stderr.await.unwrap_or_default();
            let output = [stdout.trim(), stderr.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(command_failed(args, status, &output));
        }
        Ok(())
    }

    async fn write_program(&self, program: &Program) -> Result<(), EngineError> {
        let yaml = program.to_yaml()?;
        tokio::fs::write(self.work_dir().join(PROJECT_FILE), yaml).await?;
        Ok(())
    }
}

fn command_failed(args: &[&str], status: ExitStatus, output: &str) -> EngineError {
    EngineError::CommandFailed {
        command: format!("pulumi {}", args.join(" ")),
        status: status.to_string(),
        output: output.to_string(),
    }
}

async fn read_to_string(stream: Option<impl AsyncRead + Unpin>) -> String {
    let mut buf = String::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_string(&mut buf).await {
            log::debug!("Unable to read engine output: {e}");
        }
    }
    buf
}

async fn forward(tail: &mut EventLogTail, tx: &UnboundedSender<EngineEvent>) {
    let events = match tail.read_events().await {
        Ok(events) => events,
        Err(e) => {
            log::warn!("Unable to read engine event log: {e}");
            return;
        }
    };
    for event in events {
        // A closed receiver only means nobody is listening anymore.
        if tx.send(event).is_err() {
            log::debug!("Engine event receiver closed");
        }
    }
}

/// Incremental reader of an event log that is still being written.
pub struct EventLogTail {
    reader: BufReader<File>,
    pending: Vec<u8>,
}

impl EventLogTail {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            reader: BufReader::new(file),
            pending: Vec::new(),
        })
    }

    /// Every complete line written since the last call, in file order. A
    /// trailing line without its newline is kept as raw bytes until it is
    /// completed, so a read may stop anywhere, even inside a character.
    pub async fn read_events(&mut self) -> std::io::Result<Vec<EngineEvent>> {
        let mut events = Vec::new();
        loop {
            let read = self.reader.read_until(b'\n', &mut self.pending).await?;
            if read == 0 || self.pending.last() != Some(&b'\n') {
                break;
            }
            let line = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match EngineEvent::from_json_line(line) {
                Ok(event) => events.push(event),
                Err(e) => log::warn!("Skipping unreadable engine event: {e}"),
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl ProvisioningEngine for PulumiCli {
    async fn upsert_stack(
        &self,
        stack: &StackIdentity,
        program: &Program,
    ) -> Result<(), EngineError> {
        self.write_program(program).await?;
        let name = stack.fully_qualified();
        self.run(&["stack", "select", "--create", "--stack", name.as_str()])
            .await?;
        Ok(())
    }

    async fn select_stack(&self, stack: &StackIdentity) -> Result<(), EngineError> {
        let name = stack.fully_qualified();
        self.run(&["stack", "select", "--stack", name.as_str()]).await?;
        Ok(())
    }

    async fn install_plugin(&self, plugin: &ProviderPlugin) -> Result<(), EngineError> {
        self.run(&["plugin", "install", "resource", plugin.name, plugin.version])
            .await?;
        Ok(())
    }

    async fn set_config(
        &self,
        stack: &StackIdentity,
        key: &str,
        value: &ConfigValue,
    ) -> Result<(), EngineError> {
        let name = stack.fully_qualified();
        let visibility = if value.secret { "--secret" } else { "--plaintext" };
        self.run(&[
            "config",
            "set",
            "--stack",
            name.as_str(),
            visibility,
            "--",
            key,
            value.value.as_str(),
        ])
        .await?;
        Ok(())
    }

    async fn set_program(&self, program: &Program) -> Result<(), EngineError> {
        self.write_program(program).await
    }

    async fn refresh(&self, stack: &StackIdentity) -> Result<(), EngineError> {
        let name = stack.fully_qualified();
        let output = self
            .run(&["refresh", "--yes", "--skip-preview", "--stack", name.as_str()])
            .await?;
        log::debug!("{}", output.trim());
        Ok(())
    }

    async fn preview(
        &self,
        stack: &StackIdentity,
        out: Box<dyn Write + Send>,
    ) -> Result<(), EngineError> {
        let name = stack.fully_qualified();
        self.stream(
            &["preview", "--stack", name.as_str(), "--message", "Running fh dry-run"],
            out,
        )
        .await
    }

    async fn apply(&self, stack: &StackIdentity, sink: ProgressSink) -> Result<(), EngineError> {
        let name = stack.fully_qualified();
        let args = ["up", "--yes", "--skip-preview", "--stack", name.as_str()];
        match sink {
            ProgressSink::Stream(out) => self.stream(&args, out).await,
            ProgressSink::Events(tx) => self.with_event_log(&args, tx).await,
        }
    }

    async fn list_stacks(
        &self,
        org: &str,
        project: &str,
    ) -> Result<Vec<StackSummary>, EngineError> {
        let output = self
            .run(&[
                "stack",
                "ls",
                "--json",
                "--organization",
                org,
                "--project",
                project,
            ])
            .await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn outputs(&self, stack: &StackIdentity) -> Result<OutputMap, EngineError> {
        let name = stack.fully_qualified();
        let output = self
            .run(&["stack", "output", "--json", "--stack", name.as_str()])
            .await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn destroy(
        &self,
        stack: &StackIdentity,
        options: DestroyOptions,
        out: Box<dyn Write + Send>,
    ) -> Result<(), EngineError> {
        let name = stack.fully_qualified();
        let mut args = vec!["destroy", "--stack", name.as_str()];
        if options.preview_only {
            args.push("--preview-only");
        } else {
            args.extend(["--yes", "--skip-preview"]);
        }
        self.stream(&args, out).await
    }
}
