//! Speech-to-text for voice notes.
//!
//! An empty transcription means the audio could not be understood; callers
//! treat errors the same way.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ChannelError;

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, ChannelError>;
}

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// OpenAI-compatible `audio/transcriptions` endpoint.
    pub url: String,
    pub api_key: SecretString,
    pub model: String,
    pub language: String,
}

/// Transcribes through an OpenAI-compatible HTTP endpoint.
pub struct HttpTranscriber {
    config: TranscriptionConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

impl HttpTranscriber {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, ChannelError> {
        let err = |reason: String| ChannelError::MediaFailed {
            name: "transcription".into(),
            reason,
        };

        let size = audio.len();
        // WhatsApp voice notes are OGG/Opus.
        let part = Part::bytes(audio)
            .file_name("audio.ogg")
            .mime_str("audio/ogg")
            .map_err(|e| err(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone());

        let resp = self
            .client
            .post(&self.config.url)
            .bearer_auth(self.config.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| err(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(err(format!("transcription API returned {status}: {detail}")));
        }

        let body: TranscriptionResponse = resp.json().await.map_err(|e| err(e.to_string()))?;
        let text = body.text.trim().to_string();
        tracing::info!(audio_bytes = size, chars = text.chars().count(), "Audio transcribed");
        Ok(text)
    }
}

/// Used when no transcription key is configured: every voice note is
/// reported as not understood.
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, ChannelError> {
        tracing::warn!(audio_bytes = audio.len(), "Transcription disabled, ignoring audio");
        Ok(String::new())
    }
}
