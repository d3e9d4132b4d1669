//! End-to-end tests for the Switchboard support agent.
//!
//! These drive real channels (terminal, browser socket, WhatsApp frames)
//! through `serve` and the orchestrator against a scripted model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use switchboard_agent::{APOLOGY, FALLBACK_ANSWER, SupportAgent, VOICE_UNSUPPORTED, serve};
use switchboard_channels::{CliChannel, WebChannel, parse_bridge_frame};
use switchboard_config::{AppConfig, WebConfig};
use switchboard_core::{
    ArgSchema, Channel, ChatRole, ChatTurn, FnTool, Model, ModelError, ModelReply, ToolRegistry, ToolSchema,
    Transcriber, TranscriptionError, meta, tool_fn,
};
use switchboard_security::ContactWhitelist;
use tokio::io::AsyncReadExt;
use tokio_tungstenite::{connect_async, tungstenite::Message as ClientMessage};

// ── Scripted model ───────────────────────────────────────────────────────

/// Replays scripted replies, then repeats `fallback` forever.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    fallback: ModelReply,
    seen: Mutex<Vec<Vec<ChatTurn>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<ModelReply, ModelError>>) -> Arc<Self> {
        Self::with_fallback(replies, ModelReply::Text("Anything else?".into()))
    }

    fn with_fallback(replies: Vec<Result<ModelReply, ModelError>>, fallback: ModelReply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn history(&self, call: usize) -> Vec<ChatTurn> {
        self.seen.lock().unwrap()[call].clone()
    }
}

#[async_trait::async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn generate(
        &self,
        _history: &[ChatTurn],
        _system_prompt: Option<&str>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, ModelError> {
        Ok(String::new())
    }

    async fn generate_with_tools(
        &self,
        history: &[ChatTurn],
        _tools: &[ToolSchema],
        _system_prompt: Option<&str>,
        _temperature: f32,
    ) -> Result<ModelReply, ModelError> {
        self.seen.lock().unwrap().push(history.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

struct FixedTranscriber;

#[async_trait::async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError> {
        assert_eq!(audio, b"ogg-opus");
        assert_eq!(language, "en");
        Ok("is the database up".into())
    }
}

fn status_tool(calls: Arc<AtomicUsize>) -> FnTool {
    tool_fn("get_status", "Report service status", ArgSchema::new(), move |_args| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"web": "up", "db": "up"}))
        }
    })
}

fn agent_with(model: Arc<ScriptedModel>, calls: Arc<AtomicUsize>) -> Arc<SupportAgent> {
    let mut registry = ToolRegistry::new();
    registry.register(status_tool(calls));
    Arc::new(SupportAgent::builder(model, Arc::new(registry)).build())
}

fn status_then_answer() -> Vec<Result<ModelReply, ModelError>> {
    vec![
        Ok(ModelReply::tool_call("get_status", json!({}))),
        Ok(ModelReply::Text("All green".into())),
    ]
}

/// Run `lines` through a terminal channel and return everything printed.
async fn run_cli(agent: Arc<SupportAgent>, lines: &'static [u8]) -> String {
    let (writer, mut reader) = tokio::io::duplex(64 * 1024);
    let channel = CliChannel::with_io(lines, writer);
    serve(Arc::new(channel), agent).await.unwrap();

    let mut printed = String::new();
    reader.read_to_string(&mut printed).await.unwrap();
    printed
}

// ── Terminal channel ─────────────────────────────────────────────────────

#[tokio::test]
async fn cli_status_question_runs_tool_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = ScriptedModel::new(status_then_answer());
    let agent = agent_with(model.clone(), calls.clone());

    let printed = run_cli(agent, b"status?\nexit\n").await;

    assert_eq!(printed, "All green\n");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(model.calls(), 2);

    let second = model.history(1);
    assert_eq!(second[0], ChatTurn::user("status?"));
    assert_eq!(second[1].role, ChatRole::Assistant);
    assert!(second[1].content.starts_with("[Tool result from get_status]"));
    assert!(second[1].content.contains(r#""db":"up""#));
}

#[tokio::test]
async fn cli_history_carries_between_lines() {
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::Text("Hello".into())),
        Ok(ModelReply::Text("Still here".into())),
    ]);
    let agent = agent_with(model.clone(), Arc::new(AtomicUsize::new(0)));

    let printed = run_cli(agent.clone(), b"hi\n\nanother question\n").await;

    assert_eq!(printed, "Hello\nStill here\n");
    assert_eq!(
        model.history(1),
        vec![
            ChatTurn::user("hi"),
            ChatTurn::assistant("Hello"),
            ChatTurn::user("another question"),
        ]
    );
    assert_eq!(agent.contexts().len(), 1);
    assert!(agent.clear_context("cli", "local_user").await);
}

#[tokio::test]
async fn runaway_tool_loop_ends_with_fallback() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = ScriptedModel::with_fallback(vec![], ModelReply::tool_call("get_status", json!({})));
    let agent = agent_with(model.clone(), calls.clone());

    let printed = run_cli(agent, b"keep checking\n").await;

    assert_eq!(printed, format!("{FALLBACK_ANSWER}\n"));
    assert_eq!(model.calls(), 5);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

// ── Orchestrator edge paths ──────────────────────────────────────────────

#[tokio::test]
async fn unknown_tool_is_reported_back_to_the_model() {
    let model = ScriptedModel::new(vec![
        Ok(ModelReply::tool_call("reboot_everything", json!({}))),
        Ok(ModelReply::Text("I can only check status.".into())),
    ]);
    let agent = agent_with(model.clone(), Arc::new(AtomicUsize::new(0)));

    let reply = agent
        .process_message(switchboard_core::Message::text("u1", "reboot it all"))
        .await;

    assert_eq!(reply.content.as_text(), Some("I can only check status."));
    let feedback = &model.history(1)[1].content;
    assert!(feedback.starts_with("[Tool error]"));
    assert!(feedback.contains("reboot_everything"));
    assert!(feedback.contains("get_status"));
}

#[tokio::test]
async fn model_failure_yields_apology_then_recovers() {
    let model = ScriptedModel::new(vec![
        Err(ModelError::Network("connection refused".into())),
        Ok(ModelReply::Text("Back online".into())),
    ]);
    let agent = agent_with(model, Arc::new(AtomicUsize::new(0)));

    let printed = run_cli(agent, b"first\nsecond\n").await;

    assert_eq!(printed, format!("{APOLOGY}\nBack online\n"));
}

// ── WhatsApp frames ──────────────────────────────────────────────────────

#[tokio::test]
async fn whatsapp_voice_note_is_transcribed_and_routed() {
    let frame = json!({
        "type": "message",
        "data": {
            "id": "wamid.42",
            "from": "15551234567@s.whatsapp.net",
            "fromName": "Dana",
            "messageType": "voice",
            "voiceData": "b2dnLW9wdXM=",
        }
    })
    .to_string();
    let inbound = parse_bridge_frame(&frame).unwrap().unwrap();

    let model = ScriptedModel::new(vec![Ok(ModelReply::Text("Yes, it is up.".into()))]);
    let mut registry = ToolRegistry::new();
    registry.register(status_tool(Arc::new(AtomicUsize::new(0))));
    let agent = SupportAgent::builder(model.clone(), Arc::new(registry))
        .transcriber(Some(Arc::new(FixedTranscriber)))
        .build();

    let reply = agent.process_message(inbound).await;

    assert_eq!(reply.content.as_text(), Some("Yes, it is up."));
    assert_eq!(reply.reply_to.as_deref(), Some("wamid.42"));
    assert_eq!(reply.channel.as_deref(), Some("whatsapp"));
    assert_eq!(reply.meta_str(meta::RECIPIENT), Some("15551234567@s.whatsapp.net"));
    assert_eq!(reply.meta_str(meta::ORIGINAL_TYPE), Some("voice"));
    assert_eq!(model.history(0), vec![ChatTurn::user("is the database up")]);
}

#[tokio::test]
async fn whatsapp_voice_without_transcriber_is_declined() {
    let frame = r#"{"type":"message","data":{"from":"15551234567","messageType":"voice","voiceData":"b2dnLW9wdXM="}}"#;
    let inbound = parse_bridge_frame(frame).unwrap().unwrap();
    let model = ScriptedModel::new(vec![]);
    let agent = agent_with(model.clone(), Arc::new(AtomicUsize::new(0)));

    let reply = agent.process_message(inbound).await;

    assert_eq!(reply.content.as_text(), Some(VOICE_UNSUPPORTED));
    assert_eq!(model.calls(), 0);
}

// ── Browser socket ───────────────────────────────────────────────────────

async fn next_json<S>(ws: &mut S) -> Value
where
    S: futures::Stream<Item = Result<ClientMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let ClientMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn web_socket_conversation_through_tool() {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = ScriptedModel::new(status_then_answer());
    let agent = agent_with(model.clone(), calls.clone());

    let web = Arc::new(WebChannel::new(WebConfig {
        enabled: true,
        host: "127.0.0.1".into(),
        port: 0,
    }));
    let server = tokio::spawn(serve(web.clone(), agent.clone()));

    let addr = loop {
        if let Some(addr) = web.local_addr().await {
            break addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "system");
    let user_id = welcome["user_id"].as_str().unwrap().to_string();
    assert!(user_id.starts_with("web_"));

    ws.send(ClientMessage::Text(json!({"message": "status?"}).to_string().into()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "message");
    assert_eq!(reply["message"], "All green");
    assert_eq!(reply["sender"], "agent");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        agent.contexts().session_policy("web"),
        switchboard_agent::SessionPolicy::Tracked
    );

    web.disconnect().await.unwrap();
    server.abort();
}

// ── Configuration and whitelist ──────────────────────────────────────────

#[test]
fn whitelist_from_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "[paths]\ncontacts_file = \"people.yaml\"\n").unwrap();
    let config = AppConfig::load_from(&config_path).unwrap();
    let contacts_path = config.contacts_path(dir.path());
    assert_eq!(contacts_path, dir.path().join("people.yaml"));

    let whitelist = ContactWhitelist::open(contacts_path.clone());
    assert!(whitelist.is_empty());
    assert!(whitelist.add(" 15551234567 ").unwrap());
    assert!(whitelist.add("abc123@lid").unwrap());

    let reopened = ContactWhitelist::open(contacts_path);
    assert!(reopened.is_whitelisted("+15551234567"));
    assert!(reopened.is_whitelisted("15551234567"));
    assert!(reopened.is_whitelisted("abc123@lid"));
    assert!(!reopened.is_whitelisted("abc123"));
    assert_eq!(reopened.list_all(), vec!["+15551234567", "abc123@lid"]);

    assert!(reopened.remove("15551234567").unwrap());
    assert!(!reopened.is_whitelisted("+15551234567"));
}

#[test]
fn builtin_tools_follow_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "[tools.ssh]\nenabled = true\njump_host = \"mgmt.internal\"\n\n[tools.system_status]\nenabled = false\n",
    )
    .unwrap();
    let config = AppConfig::load_from(&config_path).unwrap();

    let mut registry = ToolRegistry::new();
    switchboard_tools::register_builtin_tools(&mut registry, &config.tools);
    assert_eq!(
        registry.names(),
        vec!["execute_ssh_command", "execute_remote_server_command"]
    );
}
