//! SSH tool: run a command on a reachable host.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::time::Duration;
use switchboard_config::SshConfig;
use switchboard_core::{ArgKind, ArgSchema, Tool, ToolResult};
use tracing::{info, warn};

use crate::process::{expand_tilde, run_command};

/// Names the model uses when it means "the jump host".
const JUMP_HOST_ALIASES: &[&str] = &[
    "jump",
    "jump_server",
    "jump-server",
    "jump.server",
    "ssh_jump_host",
    "ssh_jump_server",
];

/// `ssh` arguments up to and including `user@host`.
pub(crate) fn ssh_base_args(config: &SshConfig, host: &str) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", config.timeout_secs),
    ];
    if let Some(key) = &config.key_file {
        let key = expand_tilde(key);
        if key.exists() {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        } else {
            warn!(key = %key.display(), "SSH key file not found, relying on agent/defaults");
        }
    }
    args.push(format!("{}@{}", config.username, host));
    args
}

pub struct SshCommandTool {
    config: SshConfig,
    schema: ArgSchema,
}

impl SshCommandTool {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            schema: ArgSchema::new()
                .required("server", ArgKind::String, "Server hostname or IP address")
                .with_default("command", ArgKind::String, "Command to execute", "uptime"),
        }
    }

    /// Map jump-host aliases onto the configured jump host.
    fn resolve_server<'a>(&'a self, server: &'a str) -> &'a str {
        if JUMP_HOST_ALIASES.contains(&server.to_ascii_lowercase().as_str()) {
            if let Some(jump) = &self.config.jump_host {
                return jump;
            }
        }
        server
    }
}

#[async_trait]
impl Tool for SshCommandTool {
    fn name(&self) -> &str {
        "execute_ssh_command"
    }

    fn description(&self) -> &str {
        "Execute a command on a remote server via SSH. Uses the configured SSH key and username."
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolResult {
        let requested = args["server"].as_str().unwrap_or_default();
        let command = args["command"].as_str().unwrap_or("uptime");
        let server = self.resolve_server(requested);

        info!(server, command, user = %self.config.username, "Running SSH command");

        let mut ssh_args = ssh_base_args(&self.config, server);
        ssh_args.push(command.to_string());

        // Leave headroom over ConnectTimeout for the command itself.
        let timeout = Duration::from_secs(self.config.timeout_secs * 2);
        match run_command(self.name(), "ssh", &ssh_args, &[], timeout).await {
            Ok(out) if out.success() => ToolResult::success(json!({
                "server": server,
                "command": command,
                "username": self.config.username,
                "output": out.stdout,
                "error": (!out.stderr.is_empty()).then_some(out.stderr),
                "exit_code": out.exit_code,
            })),
            Ok(out) => {
                let reason = if out.exit_code == 255 {
                    format!("SSH connection failed: {}", out.stderr)
                } else if out.stderr.is_empty() {
                    format!("Command exited with code {}", out.exit_code)
                } else {
                    out.stderr.clone()
                };
                ToolResult::failure(reason)
                    .with_metadata("server", server)
                    .with_metadata("exit_code", out.exit_code)
                    .with_metadata("output", out.stdout)
            }
            Err(e) => ToolResult::from(e).with_metadata("server", server),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SshConfig {
        SshConfig {
            enabled: true,
            username: "ops".into(),
            key_file: None,
            jump_host: Some("mgmt.example.net".into()),
            timeout_secs: 7,
        }
    }

    #[test]
    fn base_args_end_with_target() {
        let args = ssh_base_args(&config(), "db1");
        assert_eq!(args.last().unwrap(), "ops@db1");
        assert!(args.contains(&"ConnectTimeout=7".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn missing_key_file_is_skipped() {
        let mut cfg = config();
        cfg.key_file = Some("/nonexistent/id_ed25519".into());
        assert!(!ssh_base_args(&cfg, "db1").contains(&"-i".to_string()));
    }

    #[test]
    fn jump_aliases_resolve() {
        let tool = SshCommandTool::new(config());
        assert_eq!(tool.resolve_server("jump_server"), "mgmt.example.net");
        assert_eq!(tool.resolve_server("Jump"), "mgmt.example.net");
        assert_eq!(tool.resolve_server("web1"), "web1");
    }

    #[test]
    fn command_defaults_to_uptime() {
        let tool = SshCommandTool::new(config());
        let args = tool.schema().validate(&json!({"server": "web1"})).unwrap();
        assert_eq!(args["command"], "uptime");
    }

    #[tokio::test]
    async fn missing_server_fails_validation() {
        let tool = SshCommandTool::new(config());
        let result = tool.run(json!({"command": "ls"})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("validation error"));
    }
}
