//! Speech-to-text capability used for voice messages.

use async_trait::async_trait;

use crate::error::TranscriptionError;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Turn raw audio into text. `language` is an ISO-639-1 hint such as "en".
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError>;
}
