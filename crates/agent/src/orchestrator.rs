//! The support agent: one inbound message in, one reply out.
//!
//! Each message runs through a bounded loop:
//!
//! 1. **Transcribe** voice notes (if a transcriber is configured)
//! 2. **Resolve context** for `(channel, sender)` and append the user turn
//! 3. **Ask the model**: it either answers or requests a tool
//! 4. **If a tool**: run it, append the result as a synthetic assistant turn, go to 3
//! 5. **If text**: append it and reply
//!
//! After `max_tool_rounds` tool requests without an answer the agent replies
//! with a fixed fallback. Any error becomes an apology reply; nothing
//! escapes [`SupportAgent::process_message`].

use chrono::TimeDelta;
use serde_json::Value;
use std::sync::Arc;
use switchboard_core::{
    ChatRole, Error, Message, MessageKind, Model, ModelReply, Result, ToolInvocation, ToolRegistry,
    ToolResult, Transcriber, meta,
};
use tracing::{debug, error, info, warn};

use crate::context::{Clock, ContextStore, SystemClock};
use crate::prompt::SystemPrompt;

pub const FALLBACK_ANSWER: &str =
    "I've completed multiple operations. Let me know if you need anything else.";
pub const VOICE_UNSUPPORTED: &str = "Voice messages are not supported.";
pub const APOLOGY: &str =
    "Sorry, I encountered an error processing your request. Please try again later.";

const NEXT_STEP: &str = "[Analyze the result. If you have enough information, provide your final answer. Otherwise, call another tool.]";

/// Channel name used for messages that carry none.
const DEFAULT_CHANNEL: &str = "default";

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;
pub const DEFAULT_MAX_HISTORY_PAIRS: usize = 10;
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 3600;

/// Render a tool outcome the way the model sees it.
fn describe_result(result: &ToolResult) -> String {
    if result.success {
        match &result.data {
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => "OK".to_string(),
        }
    } else {
        format!("Error: {}", result.error.as_deref().unwrap_or("unknown error"))
    }
}

pub struct SupportAgent {
    model: Arc<dyn Model>,
    tools: Arc<ToolRegistry>,
    transcriber: Option<Arc<dyn Transcriber>>,
    system_prompt: String,
    contexts: ContextStore,
    max_tool_rounds: usize,
    temperature: f32,
    voice_language: String,
}

impl SupportAgent {
    pub fn builder(model: Arc<dyn Model>, tools: Arc<ToolRegistry>) -> SupportAgentBuilder {
        SupportAgentBuilder::new(model, tools)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Handle one inbound message. Always produces a reply.
    pub async fn process_message(&self, message: Message) -> Message {
        match self.try_process(&message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    sender = %message.sender_id,
                    channel = message.channel.as_deref().unwrap_or(DEFAULT_CHANNEL),
                    error = %e,
                    "Error processing message"
                );
                self.reply_for(&message, APOLOGY)
            }
        }
    }

    /// The fallible part of [`process_message`](Self::process_message).
    pub async fn try_process(&self, message: &Message) -> Result<Message> {
        let (inbound, text) = match message.kind {
            MessageKind::Voice => {
                let Some(transcriber) = &self.transcriber else {
                    info!(sender = %message.sender_id, "Voice message without transcriber");
                    return Ok(self.reply_for(message, VOICE_UNSUPPORTED));
                };
                let audio = message
                    .content
                    .as_bytes()
                    .ok_or_else(|| Error::Internal("voice message carries no audio".into()))?;
                info!(sender = %message.sender_id, bytes = audio.len(), "Transcribing voice message");
                let text = transcriber.transcribe(audio, &self.voice_language).await?;
                debug!(transcript = %text, "Transcribed");

                let mut converted = message.clone();
                converted.content = text.clone().into();
                converted.kind = MessageKind::Text;
                converted
                    .metadata
                    .insert(meta::ORIGINAL_TYPE.into(), MessageKind::Voice.as_str().into());
                (converted, text)
            }
            _ => {
                let text = message.content.as_text().ok_or_else(|| {
                    Error::Internal(format!("{} message carries no text", message.kind))
                })?;
                (message.clone(), text.to_string())
            }
        };

        let channel = inbound.channel.as_deref().unwrap_or(DEFAULT_CHANNEL);
        let clock = self.contexts.clock().clone();
        let mut ctx = self
            .contexts
            .get_or_create(channel, &inbound.sender_id, inbound.session_id())
            .await;
        ctx.add_turn(ChatRole::User, text, clock.now());

        info!(
            channel,
            sender = %inbound.sender_id,
            preview = %inbound.preview(50),
            "Processing message"
        );

        let schemas = self.tools.schema_export();
        let mut answer = None;
        for round in 1..=self.max_tool_rounds {
            let reply = self
                .model
                .generate_with_tools(
                    &ctx.export_for_model(),
                    &schemas,
                    Some(&self.system_prompt),
                    self.temperature,
                )
                .await?;

            match reply {
                ModelReply::Text(text) => {
                    answer = Some(text);
                    break;
                }
                ModelReply::ToolCall(invocation) => {
                    info!(round, tool = %invocation.tool, "Tool call");
                    let turn = self.run_tool(&invocation).await;
                    ctx.add_turn(ChatRole::Assistant, turn, clock.now());
                }
            }
        }

        let answer = answer.unwrap_or_else(|| {
            warn!(max_rounds = self.max_tool_rounds, "Max tool rounds reached");
            FALLBACK_ANSWER.to_string()
        });
        ctx.add_turn(ChatRole::Assistant, answer.clone(), clock.now());
        drop(ctx);

        info!(preview = %answer.chars().take(50).collect::<String>(), "Response generated");
        Ok(self.reply_for(&inbound, answer))
    }

    /// Run a requested tool and format the synthetic turn describing the outcome.
    async fn run_tool(&self, invocation: &ToolInvocation) -> String {
        let tool = match self.tools.get(&invocation.tool) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(tool = %invocation.tool, "Model asked for an unknown tool");
                return format!("[Tool error]\n{e}\n\n{NEXT_STEP}");
            }
        };

        debug!(tool = %invocation.tool, args = %invocation.args, "Executing tool");
        let result = tool.run(invocation.args.clone()).await;
        if result.success {
            info!(tool = %invocation.tool, "Tool succeeded");
        } else {
            warn!(tool = %invocation.tool, error = ?result.error, "Tool failed");
        }
        format!(
            "[Tool result from {}]\n{}\n\n{NEXT_STEP}",
            invocation.tool,
            describe_result(&result)
        )
    }

    /// A reply to `inbound` carrying its routing metadata plus a recipient hint.
    pub fn reply_for(&self, inbound: &Message, content: impl Into<String>) -> Message {
        let mut reply = inbound.create_reply(content);
        reply.metadata = inbound.metadata.clone();
        reply
            .metadata
            .insert(meta::RECIPIENT.into(), inbound.sender_id.clone().into());
        reply
    }

    /// Forget the conversation with one user. Returns whether it existed.
    pub async fn clear_context(&self, channel: &str, user_id: &str) -> bool {
        self.contexts.clear(channel, user_id).await
    }
}

/// Builder for [`SupportAgent`].
pub struct SupportAgentBuilder {
    model: Arc<dyn Model>,
    tools: Arc<ToolRegistry>,
    transcriber: Option<Arc<dyn Transcriber>>,
    instructions: Option<String>,
    knowledge: String,
    session_timeout: TimeDelta,
    max_history_pairs: usize,
    max_tool_rounds: usize,
    temperature: f32,
    voice_language: String,
    clock: Arc<dyn Clock>,
    tracked_channels: Vec<String>,
}

impl SupportAgentBuilder {
    fn new(model: Arc<dyn Model>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            transcriber: None,
            instructions: None,
            knowledge: String::new(),
            session_timeout: TimeDelta::seconds(DEFAULT_SESSION_TIMEOUT_SECS),
            max_history_pairs: DEFAULT_MAX_HISTORY_PAIRS,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            temperature: 0.7,
            voice_language: "en".into(),
            clock: Arc::new(SystemClock),
            tracked_channels: Vec::new(),
        }
    }

    pub fn transcriber(mut self, transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn knowledge(mut self, knowledge: impl Into<String>) -> Self {
        self.knowledge = knowledge.into();
        self
    }

    /// Replace the default instructions. The tool list and knowledge base
    /// are still appended.
    pub fn system_prompt(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn session_timeout(mut self, timeout: TimeDelta) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn max_history_pairs(mut self, pairs: usize) -> Self {
        self.max_history_pairs = pairs;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn voice_language(mut self, language: impl Into<String>) -> Self {
        self.voice_language = language.into();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn track_sessions_for(mut self, channel: impl Into<String>) -> Self {
        self.tracked_channels.push(channel.into());
        self
    }

    pub fn build(self) -> SupportAgent {
        let mut prompt = SystemPrompt::new(self.tools.schema_export()).with_knowledge(self.knowledge);
        if let Some(instructions) = self.instructions {
            prompt = prompt.with_instructions(instructions);
        }

        let contexts = ContextStore::new(self.session_timeout, self.max_history_pairs).with_clock(self.clock);
        for channel in &self.tracked_channels {
            contexts.track_sessions_for(channel);
        }

        info!(
            model = self.model.name(),
            tools = self.tools.len(),
            max_tool_rounds = self.max_tool_rounds,
            session_timeout_secs = self.session_timeout.num_seconds(),
            voice = self.transcriber.is_some(),
            "Support agent initialized"
        );

        SupportAgent {
            model: self.model,
            tools: self.tools,
            transcriber: self.transcriber,
            system_prompt: prompt.render(),
            contexts,
            max_tool_rounds: self.max_tool_rounds,
            temperature: self.temperature,
            voice_language: self.voice_language,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use switchboard_core::{
        ArgKind, ArgSchema, ChatTurn, ModelError, ToolSchema, TranscriptionError, tool_fn,
    };

    /// Replays scripted replies and records what it was shown.
    struct ScriptedModel {
        replies: Mutex<VecDeque<std::result::Result<ModelReply, ModelError>>>,
        seen: Mutex<Vec<Vec<ChatTurn>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<std::result::Result<ModelReply, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last_history(&self) -> Vec<ChatTurn> {
            self.seen.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _history: &[ChatTurn],
            _system_prompt: Option<&str>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> std::result::Result<String, ModelError> {
            Ok(String::new())
        }

        async fn generate_with_tools(
            &self,
            history: &[ChatTurn],
            _tools: &[ToolSchema],
            system_prompt: Option<&str>,
            _temperature: f32,
        ) -> std::result::Result<ModelReply, ModelError> {
            self.seen.lock().unwrap().push(history.to_vec());
            self.prompts
                .lock()
                .unwrap()
                .push(system_prompt.unwrap_or_default().to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ModelReply::tool_call("get_status", json!({}))))
        }
    }

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _audio: &[u8], _language: &str) -> std::result::Result<String, TranscriptionError> {
            Ok(self.0.to_string())
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(tool_fn(
            "get_status",
            "Report status",
            ArgSchema::new(),
            |_args| async { Ok(json!({"healthy": true})) },
        ));
        registry.register(tool_fn(
            "restart",
            "Restart a service",
            ArgSchema::new().required("service", ArgKind::String, "Service name"),
            |args| async move { Ok(json!(format!("restarted {}", args["service"].as_str().unwrap_or("?")))) },
        ));
        Arc::new(registry)
    }

    fn agent(model: Arc<ScriptedModel>) -> SupportAgent {
        SupportAgent::builder(model, registry()).build()
    }

    fn inbound(text: &str) -> Message {
        Message::text("+15551234567", text)
            .with_channel("whatsapp")
            .with_metadata("raw_id", "wamid.1")
    }

    #[tokio::test]
    async fn tool_then_answer() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::tool_call("get_status", json!({}))),
            Ok(ModelReply::Text("All green".into())),
        ]);
        let agent = agent(model.clone());
        let msg = inbound("status?");
        let reply = agent.process_message(msg.clone()).await;

        assert_eq!(reply.content.as_text(), Some("All green"));
        assert_eq!(reply.reply_to.as_deref(), Some(msg.id.as_str()));
        assert_eq!(reply.sender_id, "agent");
        assert_eq!(model.calls(), 2);

        let history = model.last_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatTurn::user("status?"));
        assert!(history[1].content.starts_with("[Tool result from get_status]\n{\"healthy\":true}"));
        assert!(history[1].content.ends_with(NEXT_STEP));
    }

    #[tokio::test]
    async fn reply_keeps_routing_metadata() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Text("hi".into()))]);
        let agent = agent(model);
        let msg = inbound("hello").with_group(Some("123@g.us".into()));
        let reply = agent.process_message(msg).await;

        assert_eq!(reply.channel.as_deref(), Some("whatsapp"));
        assert!(reply.is_group);
        assert_eq!(reply.group_id.as_deref(), Some("123@g.us"));
        assert_eq!(reply.meta_str("raw_id"), Some("wamid.1"));
        assert_eq!(reply.meta_str(meta::RECIPIENT), Some("+15551234567"));
    }

    #[tokio::test]
    async fn loop_is_bounded() {
        let model = ScriptedModel::new(vec![]);
        let agent = agent(model.clone());
        let reply = agent.process_message(inbound("loop forever")).await;

        assert_eq!(reply.content.as_text(), Some(FALLBACK_ANSWER));
        assert_eq!(model.calls(), DEFAULT_MAX_TOOL_ROUNDS);
    }

    #[tokio::test]
    async fn custom_round_limit() {
        let model = ScriptedModel::new(vec![]);
        let agent = SupportAgent::builder(model.clone(), registry())
            .max_tool_rounds(2)
            .build();
        agent.process_message(inbound("x")).await;
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::tool_call("reboot_everything", json!({}))),
            Ok(ModelReply::Text("I can't do that".into())),
        ]);
        let agent = agent(model.clone());
        let reply = agent.process_message(inbound("reboot")).await;

        assert_eq!(reply.content.as_text(), Some("I can't do that"));
        let turn = &model.last_history()[1].content;
        assert!(turn.starts_with(
            "[Tool error]\nUnknown tool: reboot_everything. Available tools: get_status, restart"
        ));
    }

    #[tokio::test]
    async fn validation_error_is_fed_back() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::tool_call("restart", json!({}))),
            Ok(ModelReply::tool_call("restart", json!({"service": "nginx"}))),
            Ok(ModelReply::Text("Restarted nginx".into())),
        ]);
        let agent = agent(model.clone());
        let reply = agent.process_message(inbound("restart it")).await;

        assert_eq!(reply.content.as_text(), Some("Restarted nginx"));
        let history = model.last_history();
        assert!(history[1].content.contains("Error: validation error"));
        assert!(history[2].content.contains("restarted nginx"));
    }

    #[tokio::test]
    async fn model_error_becomes_apology() {
        let model = ScriptedModel::new(vec![Err(ModelError::Network("connection refused".into()))]);
        let agent = agent(model);
        let msg = inbound("status?");
        let reply = agent.process_message(msg.clone()).await;

        assert_eq!(reply.content.as_text(), Some(APOLOGY));
        assert_eq!(reply.reply_to.as_deref(), Some(msg.id.as_str()));
        assert_eq!(reply.meta_str(meta::RECIPIENT), Some("+15551234567"));
    }

    #[tokio::test]
    async fn voice_without_transcriber() {
        let model = ScriptedModel::new(vec![]);
        let agent = agent(model.clone());
        let msg = Message::voice("+15551234567", b"OggS".to_vec()).with_channel("whatsapp");
        let reply = agent.process_message(msg).await;

        assert_eq!(reply.content.as_text(), Some(VOICE_UNSUPPORTED));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn voice_is_transcribed() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Text("Restarting".into()))]);
        let agent = SupportAgent::builder(model.clone(), registry())
            .transcriber(Some(Arc::new(FixedTranscriber("restart nginx"))))
            .build();
        let msg = Message::voice("+15551234567", b"OggS".to_vec()).with_channel("whatsapp");
        let reply = agent.process_message(msg).await;

        assert_eq!(reply.content.as_text(), Some("Restarting"));
        assert_eq!(reply.meta_str(meta::ORIGINAL_TYPE), Some("voice"));
        assert_eq!(model.last_history()[0], ChatTurn::user("restart nginx"));
    }

    #[tokio::test]
    async fn history_carries_across_messages() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::Text("first".into())),
            Ok(ModelReply::Text("second".into())),
        ]);
        let agent = agent(model.clone());
        agent.process_message(inbound("one")).await;
        agent.process_message(inbound("two")).await;

        assert_eq!(
            model.last_history(),
            vec![ChatTurn::user("one"), ChatTurn::assistant("first"), ChatTurn::user("two")]
        );
    }

    #[tokio::test]
    async fn idle_timeout_starts_fresh() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::Text("first".into())),
            Ok(ModelReply::Text("second".into())),
        ]);
        let agent = SupportAgent::builder(model.clone(), registry())
            .clock(clock.clone())
            .session_timeout(TimeDelta::seconds(60))
            .build();

        agent.process_message(inbound("one")).await;
        clock.advance(TimeDelta::seconds(61));
        agent.process_message(inbound("two")).await;

        assert_eq!(model.last_history(), vec![ChatTurn::user("two")]);
    }

    #[tokio::test]
    async fn new_web_session_starts_fresh() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::Text("first".into())),
            Ok(ModelReply::Text("second".into())),
        ]);
        let agent = SupportAgent::builder(model.clone(), registry())
            .track_sessions_for("web")
            .build();

        let web = |text: &str, session: &str| {
            Message::text("web_abcd1234", text)
                .with_channel("web")
                .with_metadata(meta::SESSION_ID, session)
        };
        agent.process_message(web("one", "s1")).await;
        agent.process_message(web("two", "s2")).await;

        assert_eq!(model.last_history(), vec![ChatTurn::user("two")]);
    }

    #[tokio::test]
    async fn clear_context_forgets_history() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::Text("first".into())),
            Ok(ModelReply::Text("second".into())),
        ]);
        let agent = agent(model.clone());
        agent.process_message(inbound("one")).await;
        assert!(agent.clear_context("whatsapp", "+15551234567").await);
        agent.process_message(inbound("two")).await;
        assert_eq!(model.last_history(), vec![ChatTurn::user("two")]);
    }

    #[tokio::test]
    async fn system_prompt_lists_tools_and_knowledge() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Text("ok".into()))]);
        let agent = SupportAgent::builder(model.clone(), registry())
            .knowledge("nginx runs on web1")
            .build();
        agent.process_message(inbound("hi")).await;

        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("- get_status: Report status"));
        assert!(prompt.contains("# Knowledge Base\n\nnginx runs on web1"));
        assert_eq!(prompt, agent.system_prompt());
    }

    #[test]
    fn failure_rendering() {
        assert_eq!(describe_result(&ToolResult::failure("boom")), "Error: boom");
        assert_eq!(describe_result(&ToolResult::success("plain")), "plain");
    }
}
