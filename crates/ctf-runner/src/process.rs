//! Async driver for one external tool invocation.
//!
//! The child runs with stdin closed and both output streams captured line by
//! line (and echoed at debug level). Every invocation is bounded by a
//! timeout; on expiry the child is killed and the call fails with
//! `Timeout`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use ctf_core::{CtfError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

// ─── ToolCommand ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Short name used in logs and errors (`tofu`, `ansible-playbook`).
    pub tool: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl ToolCommand {
    pub fn new(tool: impl Into<String>, program: impl Into<PathBuf>, cwd: &Path) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

// ─── ToolOutput ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code; `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// One-line description of how the tool exited, with the tail of
    /// stderr when there is any.
    pub fn failure_summary(&self, tool: &str) -> String {
        let exit = match self.code {
            Some(code) => format!("{tool} exited with code {code}"),
            None => format!("{tool} terminated by signal"),
        };
        let tail: Vec<&str> = self
            .stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        match tail.len() {
            0 => exit,
            n => format!("{exit}: {}", tail[n.saturating_sub(3)..].join(" | ")),
        }
    }
}

// ─── run ──────────────────────────────────────────────────────────────────

/// Run `cmd` to completion, or kill it once `timeout` elapses.
///
/// A non-zero exit is not an error here; callers map it to their own
/// failure variant.
pub async fn run(cmd: &ToolCommand, timeout: Duration) -> Result<ToolOutput> {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .current_dir(&cmd.cwd)
        .envs(&cmd.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(tool = %cmd.tool, cwd = %cmd.cwd.display(), argv = ?cmd.args, "spawning");

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CtfError::ToolNotFound(cmd.program.display().to_string())
        } else {
            CtfError::Io(e)
        }
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let finished = tokio::time::timeout(timeout, async {
        let (out, err) = tokio::join!(
            collect_lines(stdout, &cmd.tool),
            collect_lines(stderr, &cmd.tool)
        );
        let status = child.wait().await?;
        Ok::<_, CtfError>(ToolOutput {
            code: status.code(),
            stdout: out?,
            stderr: err?,
        })
    })
    .await;

    match finished {
        Ok(output) => {
            let output = output?;
            tracing::debug!(tool = %cmd.tool, code = ?output.code, "exited");
            Ok(output)
        }
        Err(_) => {
            let _ = child.kill().await;
            tracing::warn!(tool = %cmd.tool, "killed after {}s", timeout.as_secs());
            Err(CtfError::Timeout {
                tool: cmd.tool.clone(),
                seconds: timeout.as_secs(),
            })
        }
    }
}

async fn collect_lines<R>(stream: Option<R>, tool: &str) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(String::new());
    };
    let mut reader = BufReader::new(stream).lines();
    let mut buf = String::new();
    while let Some(line) = reader.next_line().await? {
        tracing::debug!(tool = %tool, "{line}");
        buf.push_str(&line);
        buf.push('\n');
    }
    Ok(buf)
}

/// Resolve a configured tool name against PATH; paths are taken as given.
pub fn resolve_program(name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return Ok(candidate.to_path_buf());
    }
    which::which(name).map_err(|_| CtfError::ToolNotFound(name.to_string()))
}

// ─── Tests ────────────────────────────────────────────────────────────────
