//! Build backends from configuration.

use std::sync::Arc;
use std::time::Duration;
use switchboard_config::{LlmConfig, VoiceConfig};
use switchboard_core::{Model, ModelError, Transcriber, TranscriptionError};
use tracing::info;

use crate::ollama::OllamaModel;
use crate::openai_compat::{OPENAI_URL, OPENROUTER_URL, OpenAiCompatModel};
use crate::whisper::WhisperHttpTranscriber;

/// Construct the configured model backend.
pub fn build_model(config: &LlmConfig) -> Result<Arc<dyn Model>, ModelError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let provider = config.provider.to_ascii_lowercase();

    let model: Arc<dyn Model> = match provider.as_str() {
        "ollama" => Arc::new(OllamaModel::new(
            &config.model,
            config.base_url.as_deref(),
            config.hide_reasoning,
            timeout,
        )?
        .with_max_tokens(config.max_tokens)),
        "openai" | "openrouter" | "custom" => {
            let base_url = match (provider.as_str(), &config.base_url) {
                (_, Some(url)) => url.clone(),
                ("openai", None) => OPENAI_URL.to_string(),
                ("openrouter", None) => OPENROUTER_URL.to_string(),
                _ => {
                    return Err(ModelError::NotConfigured(
                        "custom provider requires llm.base_url".into(),
                    ));
                }
            };
            if config.api_key.is_none() && provider != "custom" {
                return Err(ModelError::NotConfigured(format!(
                    "{provider} requires an API key (llm.api_key or SWITCHBOARD_LLM_API_KEY)"
                )));
            }
            Arc::new(OpenAiCompatModel::new(
                provider.clone(),
                &config.model,
                base_url,
                config.api_key.clone(),
                config.hide_reasoning,
                timeout,
            )?
            .with_max_tokens(config.max_tokens))
        }
        other => {
            return Err(ModelError::NotConfigured(format!(
                "Unknown LLM provider: {other}. Supported: ollama, openai, openrouter, custom"
            )));
        }
    };

    info!(provider = %provider, model = %config.model, "Model backend ready");
    Ok(model)
}

/// Construct the transcriber if voice is enabled.
pub fn build_transcriber(config: &VoiceConfig) -> Result<Option<Arc<dyn Transcriber>>, TranscriptionError> {
    if !config.enabled {
        return Ok(None);
    }
    let transcriber =
        WhisperHttpTranscriber::new(&config.api_url, config.api_key.clone(), &config.model)?;
    info!(url = %config.api_url, model = %config.model, "Voice transcription enabled");
    Ok(Some(Arc::new(transcriber)))
}
