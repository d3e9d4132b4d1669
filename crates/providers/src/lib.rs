//! Language model and transcription backends for Switchboard.
//!
//! All models implement the `switchboard_core::Model` trait.
//! `build_model` selects the backend from configuration.

mod http;
pub mod factory;
pub mod ollama;
pub mod openai_compat;
pub mod parse;
pub mod whisper;

pub use factory::{build_model, build_transcriber};
pub use ollama::OllamaModel;
pub use openai_compat::OpenAiCompatModel;
pub use parse::{extract_tool_call, interpret_response, strip_reasoning};
pub use whisper::WhisperHttpTranscriber;
