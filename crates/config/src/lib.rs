//! Configuration loading, validation, and management for Switchboard.
//!
//! Loads configuration from `~/.switchboard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model backends `build_model` knows how to construct.
pub const KNOWN_PROVIDERS: &[&str] = &["ollama", "openai", "openrouter", "custom"];

/// The root configuration structure.
///
/// Maps directly to `~/.switchboard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Conversation context and tool-loop limits
    #[serde(default)]
    pub session: SessionConfig,

    /// Voice transcription
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Channel settings
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Knowledge base and contacts locations
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// One of [`KNOWN_PROVIDERS`]
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint override; each provider has its own default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Strip "Let me think..." style preambles from answers
    #[serde(default = "default_true")]
    pub hide_reasoning: bool,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            hide_reasoning: true,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("hide_reasoning", &self.hide_reasoning)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle gap after which a conversation starts fresh
    #[serde(default = "default_session_timeout")]
    pub timeout_seconds: u64,

    /// History keeps at most 2x this many turns
    #[serde(default = "default_max_history_pairs")]
    pub max_history_pairs: usize,

    /// Tool-calling rounds per message before the fallback answer
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_session_timeout() -> u64 {
    3600
}
fn default_max_history_pairs() -> usize {
    10
}
fn default_max_tool_rounds() -> usize {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_session_timeout(),
            max_history_pairs: default_max_history_pairs(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Speech-to-text over an OpenAI-compatible `/audio/transcriptions` endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_voice_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_voice_model")]
    pub model: String,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_voice_url() -> String {
    "http://localhost:8000/v1".into()
}
fn default_voice_model() -> String {
    "whisper-1".into()
}
fn default_language() -> String {
    "en".into()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_voice_url(),
            api_key: None,
            model: default_voice_model(),
            language: default_language(),
        }
    }
}

impl std::fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("language", &self.language)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub system_status: SystemStatusConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SystemStatusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Settings shared by `execute_ssh_command` and `execute_remote_server_command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_ssh_username")]
    pub username: String,

    /// Private key; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,

    /// Management host that can reach the private servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump_host: Option<String>,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_ssh_username() -> String {
    "admin".into()
}
fn default_tool_timeout() -> u64 {
    30
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: default_ssh_username(),
            key_file: None,
            jump_host: None,
            timeout_secs: default_tool_timeout(),
        }
    }
}

/// Read-only MySQL access, optionally through an SSH tunnel.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_username")]
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    #[serde(default = "default_tool_timeout")]
    pub connection_timeout_secs: u64,

    #[serde(default)]
    pub use_ssh_tunnel: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_jump_host: Option<String>,

    #[serde(default = "default_tunnel_username")]
    pub ssh_username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_file: Option<String>,

    /// Local end of the `ssh -L` forward
    #[serde(default = "default_tunnel_port")]
    pub tunnel_local_port: u16,
}

fn default_db_host() -> String {
    "localhost".into()
}
fn default_db_port() -> u16 {
    3306
}
fn default_db_username() -> String {
    "root".into()
}
fn default_max_rows() -> usize {
    100
}
fn default_tunnel_username() -> String {
    "ubuntu".into()
}
fn default_tunnel_port() -> u16 {
    13306
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_db_host(),
            port: default_db_port(),
            username: default_db_username(),
            password: None,
            max_rows: default_max_rows(),
            connection_timeout_secs: default_tool_timeout(),
            use_ssh_tunnel: false,
            ssh_jump_host: None,
            ssh_username: default_tunnel_username(),
            ssh_key_file: None,
            tunnel_local_port: default_tunnel_port(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("max_rows", &self.max_rows)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("use_ssh_tunnel", &self.use_ssh_tunnel)
            .field("ssh_jump_host", &self.ssh_jump_host)
            .field("ssh_username", &self.ssh_username)
            .field("ssh_key_file", &self.ssh_key_file)
            .field("tunnel_local_port", &self.tunnel_local_port)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the WhatsApp bridge service
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
}

fn default_bridge_url() -> String {
    "http://localhost:3000".into()
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bridge_url: default_bridge_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

/// File locations, relative to the config directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_knowledge_file")]
    pub knowledge_file: PathBuf,

    #[serde(default = "default_contacts_file")]
    pub contacts_file: PathBuf,
}

fn default_knowledge_file() -> PathBuf {
    PathBuf::from("knowledge.md")
}
fn default_contacts_file() -> PathBuf {
    PathBuf::from("contacts.yaml")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            knowledge_file: default_knowledge_file(),
            contacts_file: default_contacts_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`<config_dir>/config.toml`).
    ///
    /// Environment variables override the file:
    /// - `SWITCHBOARD_LLM_PROVIDER`, `SWITCHBOARD_LLM_MODEL`, `SWITCHBOARD_LLM_BASE_URL`
    /// - `SWITCHBOARD_LLM_API_KEY`, falling back to `OPENAI_API_KEY`
    /// - `SWITCHBOARD_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = env("SWITCHBOARD_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = env("SWITCHBOARD_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = env("SWITCHBOARD_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(key) = env("SWITCHBOARD_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        } else if self.llm.api_key.is_none() {
            self.llm.api_key = env("OPENAI_API_KEY");
        }
        if let Some(level) = env("SWITCHBOARD_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Get the configuration directory path.
    ///
    /// `SWITCHBOARD_CONFIG_DIR` wins over `~/.switchboard`.
    pub fn config_dir() -> PathBuf {
        std::env::var("SWITCHBOARD_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs_home().join(".switchboard"))
    }

    /// Resolve a configured path against `config_dir`.
    pub fn resolve_path(config_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            config_dir.join(path)
        }
    }

    pub fn knowledge_path(&self, config_dir: &Path) -> PathBuf {
        Self::resolve_path(config_dir, &self.paths.knowledge_file)
    }

    pub fn contacts_path(&self, config_dir: &Path) -> PathBuf {
        Self::resolve_path(config_dir, &self.paths.contacts_file)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !KNOWN_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "llm.provider '{}' is not one of: {}",
                self.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.llm.provider == "custom" && self.llm.base_url.is_none() {
            return Err(ConfigError::ValidationError(
                "llm.base_url is required for the custom provider".into(),
            ));
        }

        if self.session.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "session.timeout_seconds must be >= 1".into(),
            ));
        }

        if self.session.max_history_pairs == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_history_pairs must be >= 1".into(),
            ));
        }

        if self.session.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_tool_rounds must be >= 1".into(),
            ));
        }

        if self.tools.database.use_ssh_tunnel && self.tools.database.ssh_jump_host.is_none() {
            return Err(ConfigError::ValidationError(
                "tools.database.ssh_jump_host is required when use_ssh_tunnel is set".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
