//! Read-only MySQL queries via the `mysql` client, optionally tunnelled
//! through a jump host with `ssh -L`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::process::Stdio;
use std::time::Duration;
use switchboard_config::DatabaseConfig;
use switchboard_core::{ArgKind, ArgSchema, Tool, ToolResult};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::process::{expand_tilde, run_command};

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "CREATE", "ALTER", "TRUNCATE", "REPLACE",
];

const ALLOWED_PREFIXES: &[&str] = &["SELECT", "DESCRIBE", "SHOW TABLES"];

/// Reject anything that is not a plain read.
pub fn check_query(query: &str) -> Result<(), String> {
    let upper = query.trim().to_uppercase();
    if !ALLOWED_PREFIXES.iter().any(|p| upper.starts_with(p)) {
        return Err(
            "Only SELECT, DESCRIBE, and SHOW TABLES queries are allowed for security reasons".into(),
        );
    }
    if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|k| upper.contains(*k)) {
        return Err(format!("Query contains forbidden keyword: {keyword}"));
    }
    Ok(())
}

/// Undo the escaping `mysql --batch` applies to field values.
fn unescape_field(raw: &str) -> Value {
    if raw == "NULL" {
        return Value::Null;
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Value::String(out)
}

/// Parse `mysql --batch` output (header line then tab-separated rows).
pub fn parse_batch_output(output: &str) -> Vec<Map<String, Value>> {
    let mut lines = output.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: Vec<&str> = header.split('\t').collect();
    lines
        .filter(|line| !line.is_empty())
        .map(|line| {
            columns
                .iter()
                .zip(line.split('\t'))
                .map(|(col, field)| (col.to_string(), unescape_field(field)))
                .collect()
        })
        .collect()
}

/// Holds an `ssh -N -L` process open; dropping it kills the tunnel.
struct TunnelGuard {
    child: Child,
}

impl TunnelGuard {
    async fn open(config: &DatabaseConfig, jump_host: &str) -> Result<Self, String> {
        let forward = format!(
            "127.0.0.1:{}:{}:{}",
            config.tunnel_local_port, config.host, config.port
        );
        let mut command = Command::new("ssh");
        command
            .args(["-N", "-o", "BatchMode=yes", "-o", "ExitOnForwardFailure=yes"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", config.connection_timeout_secs))
            .arg("-L")
            .arg(&forward);
        if let Some(key) = &config.ssh_key_file {
            command.arg("-i").arg(expand_tilde(key));
        }
        command
            .arg(format!("{}@{}", config.ssh_username, jump_host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| format!("SSH tunnel error: failed to start ssh: {e}"))?;
        let mut guard = Self { child };

        let addr = format!("127.0.0.1:{}", config.tunnel_local_port);
        let deadline = Duration::from_secs(config.connection_timeout_secs);
        let ready = tokio::time::timeout(deadline, async {
            loop {
                if TcpStream::connect(&addr).await.is_ok() {
                    return Ok(());
                }
                if let Ok(Some(status)) = guard.child.try_wait() {
                    return Err(format!("SSH tunnel error: ssh exited with {status}"));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match ready {
            Ok(Ok(())) => {
                info!(local = %addr, remote = %format!("{}:{}", config.host, config.port), "SSH tunnel established");
                Ok(guard)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(format!(
                "SSH tunnel error: not ready after {}s",
                config.connection_timeout_secs
            )),
        }
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Tunnel process already gone");
        }
    }
}

pub struct DatabaseQueryTool {
    config: DatabaseConfig,
    schema: ArgSchema,
}

impl DatabaseQueryTool {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            schema: ArgSchema::new()
                .required("database", ArgKind::String, "Database name to query")
                .required("query", ArgKind::String, "SQL SELECT query to execute"),
        }
    }

    fn mysql_args(&self, host: &str, port: u16, database: &str, query: &str) -> Vec<String> {
        vec![
            "--batch".into(),
            format!("--host={host}"),
            format!("--port={port}"),
            format!("--user={}", self.config.username),
            format!("--connect-timeout={}", self.config.connection_timeout_secs),
            format!("--database={database}"),
            "-e".into(),
            query.into(),
        ]
    }
}

#[async_trait]
impl Tool for DatabaseQueryTool {
    fn name(&self) -> &str {
        "execute_database_query"
    }

    fn description(&self) -> &str {
        "Execute a SELECT query on MySQL database. Only SELECT queries are allowed. Access via SSH tunnel through management server."
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolResult {
        let database = args["database"].as_str().unwrap_or_default();
        let query = args["query"].as_str().unwrap_or_default();
        let max_rows = self.config.max_rows;

        if let Err(reason) = check_query(query) {
            warn!(database, %reason, "Rejected database query");
            return ToolResult::failure(reason)
                .with_metadata("rows", Value::Array(Vec::new()))
                .with_metadata("row_count", 0);
        }

        let preview: String = query.chars().take(100).collect();
        info!(database, query = %preview, max_rows, "Running database query");

        let (_tunnel, host, port) = if self.config.use_ssh_tunnel {
            let Some(jump) = self.config.ssh_jump_host.as_deref() else {
                return ToolResult::failure("SSH tunnel error: no ssh_jump_host configured")
                    .with_metadata("database", database);
            };
            match TunnelGuard::open(&self.config, jump).await {
                Ok(guard) => (Some(guard), "127.0.0.1".to_string(), self.config.tunnel_local_port),
                Err(e) => return ToolResult::failure(e).with_metadata("database", database),
            }
        } else {
            (None, self.config.host.clone(), self.config.port)
        };

        let password = self.config.password.clone().unwrap_or_default();
        let envs = [("MYSQL_PWD", password.as_str())];
        let timeout = Duration::from_secs(self.config.connection_timeout_secs * 2);
        let mysql_args = self.mysql_args(&host, port, database, query);

        match run_command(self.name(), "mysql", &mysql_args, &envs, timeout).await {
            Ok(out) if out.success() => {
                let mut rows = parse_batch_output(&out.stdout);
                let truncated = rows.len() > max_rows;
                rows.truncate(max_rows);
                let row_count = rows.len();
                info!(database, row_count, truncated, "Query executed");
                ToolResult::success(json!({
                    "database": database,
                    "row_count": row_count,
                    "rows": rows,
                    "truncated": truncated,
                    "max_rows": max_rows,
                }))
            }
            Ok(out) => ToolResult::failure(format!("MySQL error: {}", out.stderr))
                .with_metadata("database", database),
            Err(e) => ToolResult::from(e).with_metadata("database", database),
        }
    }
}
