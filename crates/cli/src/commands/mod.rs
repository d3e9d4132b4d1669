pub mod chat;
pub mod contacts;
pub mod doctor;
pub mod onboard;
pub mod run;

use anyhow::Context;
use chrono::TimeDelta;
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_agent::{SupportAgent, load_knowledge};
use switchboard_config::AppConfig;
use switchboard_core::ToolRegistry;
use switchboard_security::ContactWhitelist;

/// Loaded config plus the directory its relative paths resolve against.
pub struct Setup {
    pub config: AppConfig,
    pub config_dir: PathBuf,
}

impl Setup {
    pub fn load() -> anyhow::Result<Self> {
        let config = AppConfig::load().context("Failed to load config")?;
        Ok(Self {
            config,
            config_dir: AppConfig::config_dir(),
        })
    }

    pub fn whitelist(&self) -> ContactWhitelist {
        ContactWhitelist::open(self.config.contacts_path(&self.config_dir))
    }

    /// Model, tools, transcriber and knowledge base wired into one agent.
    pub fn build_agent(&self) -> anyhow::Result<Arc<SupportAgent>> {
        let config = &self.config;
        let model = switchboard_providers::build_model(&config.llm).context("Failed to build model")?;
        let transcriber =
            switchboard_providers::build_transcriber(&config.voice).context("Failed to build transcriber")?;

        let mut registry = ToolRegistry::new();
        switchboard_tools::register_builtin_tools(&mut registry, &config.tools);

        let knowledge = load_knowledge(&config.knowledge_path(&self.config_dir));
        let timeout = TimeDelta::seconds(i64::try_from(config.session.timeout_seconds).unwrap_or(i64::MAX));

        let agent = SupportAgent::builder(model, Arc::new(registry))
            .transcriber(transcriber)
            .knowledge(knowledge)
            .session_timeout(timeout)
            .max_history_pairs(config.session.max_history_pairs)
            .max_tool_rounds(config.session.max_tool_rounds)
            .temperature(config.llm.temperature)
            .voice_language(&config.voice.language)
            .build();
        Ok(Arc::new(agent))
    }
}
