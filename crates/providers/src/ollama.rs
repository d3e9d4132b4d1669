//! Ollama backend.
//!
//! Talks to the native `/api/chat` endpoint. Ollama models get tool use by
//! prompt engineering: the tool list and a strict JSON answer format are
//! appended to the system prompt, and the reply is run through
//! [`interpret_response`](crate::parse::interpret_response).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchboard_core::tool::ToolSchema;
use switchboard_core::{ChatTurn, Model, ModelError, ModelReply};
use tracing::debug;

use crate::http::{DEFAULT_MAX_TOKENS, build_client, check_status, transport_error};
use crate::parse::interpret_response;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub struct OllamaModel {
    model: String,
    base_url: String,
    hide_reasoning: bool,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(
        model: impl Into<String>,
        base_url: Option<&str>,
        hide_reasoning: bool,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            model: model.into(),
            base_url: base_url
                .unwrap_or(DEFAULT_OLLAMA_URL)
                .trim_end_matches('/')
                .to_string(),
            hide_reasoning,
            max_tokens: DEFAULT_MAX_TOKENS,
            client: build_client(timeout)?,
        })
    }

    /// Token limit (`num_predict`) for tool-loop requests.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages<'a>(history: &'a [ChatTurn], system_prompt: Option<&'a str>) -> Vec<ApiMessage<'a>> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
            messages.push(ApiMessage {
                role: "system",
                content: prompt,
            });
        }
        messages.extend(history.iter().map(|t| ApiMessage {
            role: t.role.as_str(),
            content: &t.content,
        }));
        messages
    }
}

/// Render tools as `- name(arg: description, ...): description` lines.
pub fn format_tools(tools: &[ToolSchema]) -> String {
    tools
        .iter()
        .map(|t| {
            let params = t.parameters["properties"]
                .as_object()
                .map(|props| {
                    props
                        .iter()
                        .map(|(name, spec)| {
                            let desc = spec["description"].as_str().unwrap_or(name);
                            format!("{name}: {desc}")
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            format!("- {}({}): {}", t.name, params, t.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// System prompt with the tool list and JSON tool-call instructions appended.
pub fn tool_prompt(system_prompt: Option<&str>, tools: &[ToolSchema]) -> String {
    format!(
        r#"{}

Available tools:
{}

TOOL USAGE INSTRUCTIONS:

When the user asks you to DO something (check, connect, query, get, show, etc.):
1. Identify which tool matches the task
2. Respond with ONLY a JSON object, no explanations and no "I will..." text
3. Format: {{"tool": "tool_name", "args": {{"arg1": "value1"}}}}

Examples:
- "check system status" -> {{"tool": "get_system_status", "args": {{}}}}
- "query the customer database" -> {{"tool": "execute_database_query", "args": {{"database": "customer", "query": "SELECT ..."}}}}

Only respond with plain text AFTER getting tool results, to explain them to the user."#,
        system_prompt.unwrap_or_default(),
        format_tools(tools)
    )
}

#[async_trait]
impl Model for OllamaModel {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        history: &[ChatTurn],
        system_prompt: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: Self::build_messages(history, system_prompt),
            stream: false,
            options: ChatOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        debug!(model = %self.model, turns = history.len(), "Sending Ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status("ollama", response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        Ok(parsed.message.content)
    }

    async fn generate_with_tools(
        &self,
        history: &[ChatTurn],
        tools: &[ToolSchema],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ModelReply, ModelError> {
        let prompt = tool_prompt(system_prompt, tools);
        let text = self
            .generate(history, Some(&prompt), temperature, self.max_tokens)
            .await?;
        Ok(interpret_response(&text, self.hide_reasoning))
    }

    async fn health_check(&self) -> Result<bool, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}
