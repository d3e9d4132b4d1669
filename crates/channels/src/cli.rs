//! CLI channel: interactive terminal chat.
//!
//! Reads lines from stdin and writes replies to stdout. Used by
//! `switchboard chat`.

use async_trait::async_trait;
use switchboard_core::{Channel, ChannelError, Message, MessageStream};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};

const LOCAL_USER: &str = "local_user";

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    user_id: String,
    input: Mutex<Option<Input>>,
    output: Mutex<Output>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::with_io(BufReader::new(io::stdin()), io::stdout())
    }

    /// Use arbitrary reader/writer instead of the terminal.
    pub fn with_io(
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            user_id: LOCAL_USER.to_string(),
            input: Mutex::new(Some(Box::new(input))),
            output: Mutex::new(Box::new(output)),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn is_exit_command(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn listen(&self) -> Result<MessageStream, ChannelError> {
        let input = self
            .input
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::NotConnected("stdin already consumed".into()))?;

        let (tx, rx) = mpsc::channel(32);
        let user_id = self.user_id.clone();

        tokio::spawn(async move {
            let mut lines = input.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if is_exit_command(line) {
                            break;
                        }
                        let msg = Message::text(&user_id, line)
                            .with_channel("cli")
                            .with_sender_name("User");
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let mut out = self.output.lock().await;
        let line = format!("{}\n", message.content);
        let io_err = |e: io::Error| ChannelError::DeliveryFailed {
            channel: "cli".into(),
            reason: e.to_string(),
        };
        out.write_all(line.as_bytes()).await.map_err(io_err)?;
        out.flush().await.map_err(io_err)
    }

    async fn is_authorized(&self, _sender_id: &str) -> bool {
        true // local user
    }
}
