//! OpenAI-compatible backend.
//!
//! Works with: OpenAI, OpenRouter, vLLM, LM Studio, and any endpoint that
//! exposes `/chat/completions`.
//!
//! Supports:
//! - Native function calling via `tools`
//! - Falling back to tool calls written out as JSON text
//! - Reasoning models (`o1*`), which take neither temperature, max_tokens nor tools

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchboard_core::tool::ToolSchema;
use switchboard_core::{ChatTurn, Model, ModelError, ModelReply, ToolInvocation};
use tracing::{debug, warn};

use crate::http::{DEFAULT_MAX_TOKENS, build_client, check_status, transport_error};
use crate::parse::interpret_response;

pub const OPENAI_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

/// An OpenAI-compatible chat model.
pub struct OpenAiCompatModel {
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    hide_reasoning: bool,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        hide_reasoning: bool,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            name: name.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            hide_reasoning,
            max_tokens: DEFAULT_MAX_TOKENS,
            client: build_client(timeout)?,
        })
    }

    /// Completion limit sent as `max_tokens` on tool-loop requests.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `o1` family models reject sampling parameters and tools.
    pub fn is_reasoning_model(&self) -> bool {
        self.model.starts_with("o1")
    }

    fn to_api_messages<'a>(history: &'a [ChatTurn], system_prompt: Option<&'a str>) -> Vec<ApiMessage<'a>> {
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

    fn to_api_tools(tools: &[ToolSchema]) -> Vec<ApiToolDefinition<'_>> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function",
                function: ApiToolFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect()
    }

    async fn complete(&self, body: serde_json::Value) -> Result<ApiResponseMessage, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(&self.name, response).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ModelError::MalformedResponse("No choices in response".into()))
    }

    fn request_body(
        &self,
        history: &[ChatTurn],
        system_prompt: Option<&str>,
        temperature: f32,
        max_tokens: Option<u32>,
        tools: &[ToolSchema],
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(history, system_prompt),
        });
        if !self.is_reasoning_model() {
            body["temperature"] = serde_json::json!(temperature);
            if let Some(max_tokens) = max_tokens {
                body["max_tokens"] = serde_json::json!(max_tokens);
            }
            if !tools.is_empty() {
                body["tools"] = serde_json::json!(Self::to_api_tools(tools));
            }
        }
        body
    }
}

/// Decode the arguments string of a native function call.
fn parse_arguments(tool: &str, raw: &str) -> Result<serde_json::Value, ModelError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| {
        ModelError::MalformedResponse(format!("Invalid arguments for tool call '{tool}': {e}"))
    })
}

#[async_trait]
impl Model for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        history: &[ChatTurn],
        system_prompt: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelError> {
        debug!(backend = %self.name, model = %self.model, "Sending completion request");
        let body = self.request_body(history, system_prompt, temperature, Some(max_tokens), &[]);
        let message = self.complete(body).await?;
        Ok(message.content.unwrap_or_default())
    }

    async fn generate_with_tools(
        &self,
        history: &[ChatTurn],
        tools: &[ToolSchema],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ModelReply, ModelError> {
        debug!(
            backend = %self.name,
            model = %self.model,
            tools = tools.len(),
            "Sending completion request with tools"
        );
        let body = self.request_body(history, system_prompt, temperature, Some(self.max_tokens), tools);
        let message = self.complete(body).await?;

        let native_call = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|tc| tc.function)
            .or(message.function_call);

        if let Some(function) = native_call {
            if message.content.as_deref().is_some_and(|c| !c.trim().is_empty()) {
                debug!("Ignoring text that accompanied a native tool call");
            }
            let args = parse_arguments(&function.name, &function.arguments)?;
            return Ok(ModelReply::ToolCall(ToolInvocation {
                tool: function.name,
                args,
            }));
        }

        let content = message.content.unwrap_or_default();
        if content.is_empty() {
            warn!(backend = %self.name, "Model returned an empty answer");
        }
        Ok(interpret_response(&content, self.hide_reasoning))
    }

    async fn health_check(&self) -> Result<bool, ModelError> {
        let url = format!("{}/models", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition<'a> {
    r#type: &'static str,
    function: ApiToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
    /// Legacy single-function field
    #[serde(default)]
    function_call: Option<ApiFunction>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Serve a fixed completion body and record the request.
    async fn mock_completion(reply: Value) -> (String, Arc<Mutex<Option<Value>>>) {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        let router = Router::new().route(
            "/chat/completions",
            post(move |Json(body): Json<Value>| {
                let seen = Arc::clone(&seen_clone);
                let reply = reply.clone();
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(reply)
                }
            }),
        );
        (serve(router).await, seen)
    }

    fn model(base: &str, name: &str) -> OpenAiCompatModel {
        OpenAiCompatModel::new("openai", name, base, Some("sk-test".into()), true, Duration::from_secs(5))
            .unwrap()
    }

    fn tools() -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "get_status".into(),
            description: "Status".into(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }]
    }

    #[tokio::test]
    async fn native_tool_call() {
        let (base, seen) = mock_completion(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{"id": "call_1", "type": "function",
                    "function": {"name": "get_status", "arguments": "{\"verbose\":true}"}}]
            }}]
        }))
        .await;

        let reply = model(&base, "gpt-4o-mini")
            .generate_with_tools(&[ChatTurn::user("status?")], &tools(), Some("sys"), 0.3)
            .await
            .unwrap();
        assert_eq!(reply, ModelReply::tool_call("get_status", json!({"verbose": true})));

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["function"]["name"], "get_status");
        assert!(body.get("temperature").is_some());
        assert_eq!(body["max_tokens"], 2000);
    }

    #[tokio::test]
    async fn configured_token_limit_is_sent() {
        let (base, seen) = mock_completion(json!({
            "choices": [{"message": {"content": "All green"}}]
        }))
        .await;

        model(&base, "gpt-4o-mini")
            .with_max_tokens(256)
            .generate_with_tools(&[ChatTurn::user("status?")], &tools(), None, 0.3)
            .await
            .unwrap();
        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["max_tokens"], 256);
    }

    #[tokio::test]
    async fn text_tool_call_fallback() {
        let (base, _) = mock_completion(json!({
            "choices": [{"message": {
                "content": "Checking.\n```json\n{\"tool\": \"get_status\", \"args\": {}}\n```"
            }}]
        }))
        .await;

        let reply = model(&base, "gpt-4o-mini")
            .generate_with_tools(&[ChatTurn::user("status?")], &tools(), None, 0.3)
            .await
            .unwrap();
        assert_eq!(reply, ModelReply::tool_call("get_status", json!({})));
    }

    #[tokio::test]
    async fn reasoning_model_omits_sampling_and_tools() {
        let (base, seen) = mock_completion(json!({
            "choices": [{"message": {"content": "Reasoning: hmm\nAll green"}}]
        }))
        .await;

        let reply = model(&base, "o1-mini")
            .generate_with_tools(&[ChatTurn::user("status?")], &tools(), None, 0.3)
            .await
            .unwrap();
        assert_eq!(reply, ModelReply::Text("All green".into()));

        let body = seen.lock().unwrap().clone().unwrap();
        assert!(body.get("temperature").is_none());
        assert!(body.get("tools").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        for (status, check) in [
            (StatusCode::UNAUTHORIZED, "auth"),
            (StatusCode::TOO_MANY_REQUESTS, "rate"),
            (StatusCode::BAD_GATEWAY, "api"),
        ] {
            let router = Router::new().route(
                "/chat/completions",
                post(move || async move { (status, "nope") }),
            );
            let base = serve(router).await;
            let err = model(&base, "gpt-4o")
                .generate(&[ChatTurn::user("hi")], None, 0.7, 10)
                .await
                .unwrap_err();
            match check {
                "auth" => assert!(matches!(err, ModelError::Authentication(_))),
                "rate" => assert!(matches!(err, ModelError::RateLimited { .. })),
                _ => assert!(matches!(err, ModelError::Api { status_code: 502, .. })),
            }
        }
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let (base, _) = mock_completion(json!({"choices": []})).await;
        let err = model(&base, "gpt-4o")
            .generate(&[ChatTurn::user("hi")], None, 0.7, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MalformedResponse(_)));
    }
}
