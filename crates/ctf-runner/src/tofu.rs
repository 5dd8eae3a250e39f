//! OpenTofu / Terraform provisioner.
//!
//! Each track's `terraform/` directory is its own working directory and
//! holds its own state, so concurrent calls for different tracks share
//! nothing. `apply` runs with `-json` and the output map is read from the
//! machine-readable `outputs` message.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use ctf_core::config::Config;
use ctf_core::{CtfError, DeployTarget, InfraOutputs, Provisioner, Result, Track};
use serde::Deserialize;

use crate::process::{self, ToolCommand};

const CANDIDATES: [&str; 2] = ["tofu", "terraform"];

#[derive(Debug, Clone)]
pub struct TofuProvisioner {
    tool: String,
    program: PathBuf,
    timeout: Duration,
}

impl TofuProvisioner {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        let program = program.into();
        let tool = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tofu".to_string());
        Self {
            tool,
            program,
            timeout,
        }
    }

    /// Use the configured binary, or the first of `tofu`, `terraform` on PATH.
    pub fn from_config(config: &Config) -> Result<Self> {
        let program = match config.provisioner.as_deref() {
            Some(name) => process::resolve_program(name)?,
            None => detect()
                .ok_or_else(|| CtfError::ToolNotFound(CANDIDATES.join(" or ")))?,
        };
        Ok(Self::new(program, config.provision_timeout()))
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    fn command(&self, track: &Track) -> ToolCommand {
        ToolCommand::new(&self.tool, &self.program, &track.infra_dir())
            .env("TF_IN_AUTOMATION", "1")
    }

    fn with_vars(cmd: ToolCommand, target: &DeployTarget) -> ToolCommand {
        cmd.args([
            "-var".to_string(),
            format!("deploy={}", target.mode),
            "-var".to_string(),
            format!("incus_remote={}", target.remote),
        ])
    }

    async fn ensure_init(&self, track: &Track) -> Result<()> {
        if track.infra_dir().join(".terraform").is_dir() {
            return Ok(());
        }
        tracing::info!(tool = %self.tool, "initializing working directory");
        let cmd = self.command(track).args(["init", "-input=false", "-no-color"]);
        let out = process::run(&cmd, self.timeout).await?;
        if !out.success() {
            return Err(CtfError::Provision(out.failure_summary(&format!(
                "{} init",
                self.tool
            ))));
        }
        Ok(())
    }

    /// Dry-run the track's infrastructure and return the plan text.
    ///
    /// Only the track's own working directory is touched; the deployment
    /// store is not involved.
    pub async fn plan(&self, track: &Track, target: &DeployTarget) -> Result<String> {
        self.ensure_init(track).await?;
        let cmd = self
            .command(track)
            .args(["plan", "-input=false", "-no-color"]);
        let out = process::run(&Self::with_vars(cmd, target), self.timeout).await?;
        if !out.success() {
            return Err(CtfError::Provision(out.failure_summary(&self.tool)));
        }
        Ok(out.stdout)
    }
}

fn detect() -> Option<PathBuf> {
    CANDIDATES.iter().find_map(|name| which::which(name).ok())
}

impl Provisioner for TofuProvisioner {
    async fn apply(&self, track: &Track, target: &DeployTarget) -> Result<InfraOutputs> {
        self.ensure_init(track).await?;
        let cmd = self.command(track).args([
            "apply",
            "-auto-approve",
            "-input=false",
            "-no-color",
            "-json",
        ]);
        let out = process::run(&Self::with_vars(cmd, target), self.timeout).await?;
        let stream = ApplyStream::parse(&out.stdout);

        if !out.success() {
            let cause = if stream.errors.is_empty() {
                out.failure_summary(&self.tool)
            } else {
                stream.errors.join("; ")
            };
            return Err(CtfError::Provision(cause));
        }

        match stream.outputs {
            Some(outputs) => Ok(outputs),
            None => self.outputs(track, target).await,
        }
    }

    async fn destroy(&self, track: &Track, target: &DeployTarget) -> Result<()> {
        self.ensure_init(track).await?;
        let cmd = self
            .command(track)
            .args(["destroy", "-auto-approve", "-input=false", "-no-color"]);
        let out = process::run(&Self::with_vars(cmd, target), self.timeout).await?;
        if !out.success() {
            return Err(CtfError::Provision(out.failure_summary(&self.tool)));
        }
        Ok(())
    }

    async fn outputs(&self, track: &Track, _target: &DeployTarget) -> Result<InfraOutputs> {
        let cmd = self.command(track).args(["output", "-json"]);
        let out = process::run(&cmd, self.timeout).await?;
        if !out.success() {
            return Err(CtfError::Provision(out.failure_summary(&self.tool)));
        }
        parse_output_json(&out.stdout)
    }
}

// ─── Machine-readable output ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OutputValue {
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Diagnostic {
    severity: String,
    summary: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamMessage {
    Outputs {
        outputs: BTreeMap<String, OutputValue>,
    },
    Diagnostic {
        diagnostic: Diagnostic,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default)]
struct ApplyStream {
    outputs: Option<InfraOutputs>,
    errors: Vec<String>,
}

impl ApplyStream {
    /// Read the JSON-lines stream of `apply -json`; non-JSON lines are skipped.
    fn parse(stdout: &str) -> Self {
        let mut stream = ApplyStream::default();
        for line in stdout.lines().map(str::trim).filter(|l| l.starts_with('{')) {
            match serde_json::from_str::<StreamMessage>(line) {
                Ok(StreamMessage::Outputs { outputs }) => {
                    stream.outputs = Some(to_infra_outputs(outputs));
                }
                Ok(StreamMessage::Diagnostic { diagnostic }) if diagnostic.severity == "error" => {
                    let message = if diagnostic.detail.is_empty() {
                        diagnostic.summary
                    } else {
                        format!("{}: {}", diagnostic.summary, diagnostic.detail)
                    };
                    stream.errors.push(message);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("skipping unparseable line: {e}"),
            }
        }
        stream
    }
}

fn to_infra_outputs(raw: BTreeMap<String, OutputValue>) -> InfraOutputs {
    raw.into_iter()
        .map(|(name, v)| {
            let value = match v.value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect()
}

/// Parse `output -json`: `{ name: { value, type, sensitive } }`.
fn parse_output_json(stdout: &str) -> Result<InfraOutputs> {
    if stdout.trim().is_empty() {
        return Ok(InfraOutputs::new());
    }
    let raw: BTreeMap<String, OutputValue> = serde_json::from_str(stdout)?;
    Ok(to_infra_outputs(raw))
}

// ─── Tests ────────────────────────────────────────────────────────────────
