//! Subprocess helpers shared by the tools.
//!
//! Every child is spawned with `kill_on_drop`, so a timed-out or abandoned
//! command never outlives the future that started it.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use switchboard_core::ToolError;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `program args..` to completion within `timeout`.
pub async fn run_command(
    tool_name: &str,
    program: &str,
    args: &[String],
    envs: &[(&str, &str)],
    timeout: Duration,
) -> Result<CommandOutput, ToolError> {
    debug!(tool = tool_name, program, ?args, "Spawning command");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    let child = command.spawn().map_err(|e| ToolError::ExecutionFailed {
        tool_name: tool_name.to_string(),
        reason: format!("failed to start {program}: {e}"),
    })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ToolError::Timeout {
            tool_name: tool_name.to_string(),
            timeout_secs: timeout.as_secs(),
        })?
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: e.to_string(),
        })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|_| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
