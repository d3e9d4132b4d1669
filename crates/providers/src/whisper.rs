//! Voice transcription over an OpenAI-compatible `/audio/transcriptions` endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use switchboard_core::{Transcriber, TranscriptionError};
use tracing::debug;

pub struct WhisperHttpTranscriber {
    api_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl WhisperHttpTranscriber {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| TranscriptionError::Unavailable(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Transcriber for WhisperHttpTranscriber {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError> {
        let url = format!("{}/audio/transcriptions", self.api_url);
        debug!(bytes = audio.len(), language, "Sending audio for transcription");

        let file = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("voice.ogg")
            .mime_str("audio/ogg")
            .map_err(|e| TranscriptionError::Failed(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", language.to_string());

        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscriptionError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Failed(format!("HTTP {status}: {body}")));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Failed(format!("Failed to parse response: {e}")))?;
        Ok(parsed.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::json;

    #[tokio::test]
    async fn transcript_is_trimmed() {
        let router = Router::new().route(
            "/v1/audio/transcriptions",
            post(|| async { Json(json!({"text": "  restart the web server \n"})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let transcriber =
            WhisperHttpTranscriber::new(format!("http://{addr}/v1/"), None, "whisper-1").unwrap();
        let text = transcriber.transcribe(b"OggS....", "en").await.unwrap();
        assert_eq!(text, "restart the web server");
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let transcriber =
            WhisperHttpTranscriber::new("http://127.0.0.1:9", None, "whisper-1").unwrap();
        let err = transcriber.transcribe(b"x", "en").await.unwrap_err();
        assert!(matches!(err, TranscriptionError::Unavailable(_)));
    }
}
