//! Run a command on a private server by name, through the jump host.
//!
//! The jump host keeps an inventory at `~/servers.json`:
//!
//! ```json
//! { "cert_path": "/home/ubuntu/certs",
//!   "servers": [ { "name": "appserver1", "command": "ssh -i ${CERT_PATH}/app.pem ubuntu@10.0.0.5" } ] }
//! ```
//!
//! The server's `command` is the SSH invocation to use from the jump host.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use switchboard_config::SshConfig;
use switchboard_core::{ArgKind, ArgSchema, Tool, ToolResult};
use tracing::info;

use crate::process::run_command;
use crate::ssh::ssh_base_args;

const DEFAULT_CERT_PATH: &str = "/home/ubuntu/certs";

#[derive(Debug, Deserialize)]
pub struct ServerInventory {
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub command: String,
}

impl ServerInventory {
    /// The SSH command for `name` (case-insensitive) with `${CERT_PATH}`
    /// substituted, or the list of known names.
    pub fn connect_command(&self, name: &str) -> Result<String, Vec<String>> {
        let wanted = name.to_lowercase();
        match self.servers.iter().find(|s| s.name.to_lowercase() == wanted) {
            Some(entry) => {
                let cert_path = self.cert_path.as_deref().unwrap_or(DEFAULT_CERT_PATH);
                Ok(entry.command.replace("${CERT_PATH}", cert_path))
            }
            None => Err(self.servers.iter().map(|s| s.name.clone()).collect()),
        }
    }
}

/// Quote `s` for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub struct RemoteServerTool {
    config: SshConfig,
    schema: ArgSchema,
}

impl RemoteServerTool {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            schema: ArgSchema::new()
                .required("server_name", ArgKind::String, "Server name")
                .required("command", ArgKind::String, "Command to execute on the remote server"),
        }
    }

    async fn on_jump_host(&self, jump: &str, remote: String) -> Result<crate::process::CommandOutput, ToolResult> {
        let mut args = ssh_base_args(&self.config, jump);
        args.push(remote);
        run_command(
            self.name(),
            "ssh",
            &args,
            &[],
            Duration::from_secs(self.config.timeout_secs * 2),
        )
        .await
        .map_err(ToolResult::from)
    }
}

#[async_trait]
impl Tool for RemoteServerTool {
    fn name(&self) -> &str {
        "execute_remote_server_command"
    }

    fn description(&self) -> &str {
        "Execute a command on a remote server by name. Looks the server up in servers.json on the jump server and connects through it. Use this instead of execute_ssh_command for servers that are not directly accessible."
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolResult {
        let server_name = args["server_name"].as_str().unwrap_or_default();
        let command = args["command"].as_str().unwrap_or_default();

        let Some(jump) = self.config.jump_host.as_deref() else {
            return ToolResult::failure("No jump host configured (tools.ssh.jump_host)");
        };

        info!(server = server_name, command, "Looking up server in inventory");
        let listing = match self.on_jump_host(jump, "cat ~/servers.json".into()).await {
            Ok(out) if out.success() => out.stdout,
            Ok(out) => return ToolResult::failure(format!("Failed to read servers.json: {}", out.stderr)),
            Err(result) => return result,
        };

        let inventory: ServerInventory = match serde_json::from_str(&listing) {
            Ok(inv) => inv,
            Err(e) => return ToolResult::failure(format!("Failed to parse servers.json: {e}")),
        };

        let connect = match inventory.connect_command(server_name) {
            Ok(c) => c,
            Err(available) => {
                return ToolResult::failure(format!(
                    "Server '{server_name}' not found. Available servers: {}",
                    available.join(", ")
                ))
                .with_metadata("available_servers", available);
            }
        };

        info!(server = server_name, "Executing command through jump host");
        match self.on_jump_host(jump, format!("{connect} {}", shell_quote(command))).await {
            Ok(out) if out.success() => ToolResult::success(json!({
                "server_name": server_name,
                "output": out.stdout,
                "error": (!out.stderr.is_empty()).then_some(out.stderr),
                "exit_code": out.exit_code,
            })),
            Ok(out) => {
                let reason = if out.stderr.is_empty() {
                    "Command execution failed".to_string()
                } else {
                    out.stderr
                };
                ToolResult::failure(reason)
                    .with_metadata("server_name", server_name)
                    .with_metadata("exit_code", out.exit_code)
                    .with_metadata("output", out.stdout)
            }
            Err(result) => result,
        }
    }
}
