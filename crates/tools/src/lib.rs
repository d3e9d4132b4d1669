//! Built-in support tools for Switchboard.
//!
//! Each tool is a thin wrapper over a system command (`ssh`, `mysql`, `df`)
//! configured once at construction from [`ToolsConfig`].

pub mod database;
pub mod process;
pub mod remote_server;
pub mod ssh;
pub mod system_status;

pub use database::DatabaseQueryTool;
pub use remote_server::RemoteServerTool;
pub use ssh::SshCommandTool;
pub use system_status::SystemStatusTool;

use switchboard_config::ToolsConfig;
use switchboard_core::ToolRegistry;
use tracing::info;

/// Register every enabled built-in tool.
pub fn register_builtin_tools(registry: &mut ToolRegistry, config: &ToolsConfig) {
    if config.system_status.enabled {
        registry.register(SystemStatusTool::new());
    }
    if config.ssh.enabled {
        registry.register(SshCommandTool::new(config.ssh.clone()));
        if config.ssh.jump_host.is_some() {
            registry.register(RemoteServerTool::new(config.ssh.clone()));
        }
    }
    if config.database.enabled {
        registry.register(DatabaseQueryTool::new(config.database.clone()));
    }
    info!(count = registry.len(), tools = ?registry.names(), "Registered built-in tools");
}
