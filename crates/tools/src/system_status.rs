//! Host health snapshot read from `/proc` and `df`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::time::Duration;
use switchboard_core::{ArgSchema, Tool, ToolResult};
use tracing::debug;

use crate::process::run_command;

async fn read_proc(path: &str) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Some(s.trim().to_string()),
        Err(e) => {
            debug!(path, error = %e, "Unable to read proc file");
            None
        }
    }
}

/// `(1m, 5m, 15m)` from `/proc/loadavg`.
pub fn parse_loadavg(raw: &str) -> Option<(f64, f64, f64)> {
    let mut fields = raw.split_whitespace().map(|f| f.parse::<f64>().ok());
    Some((fields.next()??, fields.next()??, fields.next()??))
}

/// Used-memory percentage from `/proc/meminfo`.
pub fn parse_memory_percent(raw: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        raw.lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some(round1((total - available) / total * 100.0))
}

/// Use% of the filesystem from `df -P` output.
pub fn parse_df_percent(raw: &str) -> Option<f64> {
    raw.lines()
        .nth(1)?
        .split_whitespace()
        .nth(4)?
        .trim_end_matches('%')
        .parse()
        .ok()
}

/// Render `/proc/uptime` seconds as `"3 days, 4:05:06"`.
pub fn format_uptime(raw: &str) -> Option<String> {
    let secs = raw.split_whitespace().next()?.parse::<f64>().ok()? as u64;
    let days = secs / 86_400;
    let (h, m, s) = ((secs % 86_400) / 3600, (secs % 3600) / 60, secs % 60);
    Some(match days {
        0 => format!("{h}:{m:02}:{s:02}"),
        1 => format!("1 day, {h}:{m:02}:{s:02}"),
        d => format!("{d} days, {h}:{m:02}:{s:02}"),
    })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub struct SystemStatusTool {
    schema: ArgSchema,
}

impl SystemStatusTool {
    pub fn new() -> Self {
        Self {
            schema: ArgSchema::new(),
        }
    }
}

impl Default for SystemStatusTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SystemStatusTool {
    fn name(&self) -> &str {
        "get_system_status"
    }

    fn description(&self) -> &str {
        "Get current system status including load, memory, and disk usage"
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn execute(&self, _args: Map<String, Value>) -> ToolResult {
        let hostname = read_proc("/proc/sys/kernel/hostname").await;
        let os = match (
            read_proc("/proc/sys/kernel/ostype").await,
            read_proc("/proc/sys/kernel/osrelease").await,
        ) {
            (Some(t), Some(r)) => Some(format!("{t} {r}")),
            (t, _) => t.or_else(|| Some(std::env::consts::OS.to_string())),
        };
        let load = read_proc("/proc/loadavg").await.as_deref().and_then(parse_loadavg);
        let memory_percent = read_proc("/proc/meminfo")
            .await
            .as_deref()
            .and_then(parse_memory_percent);
        let uptime = read_proc("/proc/uptime").await.as_deref().and_then(format_uptime);

        let df_args = ["-P".to_string(), "/".to_string()];
        let disk_percent = match run_command(self.name(), "df", &df_args, &[], Duration::from_secs(10)).await {
            Ok(out) if out.success() => parse_df_percent(&out.stdout),
            Ok(out) => {
                debug!(stderr = %out.stderr, "df failed");
                None
            }
            Err(e) => {
                debug!(error = %e, "df unavailable");
                None
            }
        };

        ToolResult::success(json!({
            "hostname": hostname,
            "os": os,
            "load_average": load.map(|(a, b, c)| json!([a, b, c])),
            "memory_percent": memory_percent,
            "disk_percent": disk_percent,
            "uptime": uptime,
        }))
    }
}
