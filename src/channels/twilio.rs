//! Twilio WhatsApp channel: outbound messages through the REST API and
//! authenticated media downloads.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{MediaAttachment, MediaFetcher, MessageSender};
use crate::error::ChannelError;

/// Longest body sent in one message. WhatsApp accepts 1600; the margin
/// leaves room for provider formatting.
pub const TWILIO_MAX_MESSAGE_LENGTH: usize = 1500;

const MEDIA_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Sender address, e.g. `whatsapp:+14155238886`.
    pub from_number: String,
    pub api_base: String,
}

pub struct TwilioChannel {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl TwilioChannel {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// Send a single chunk (at most [`TWILIO_MAX_MESSAGE_LENGTH`] chars).
    async fn send_chunk(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let form = [
            ("From", self.config.from_number.as_str()),
            ("To", to),
            ("Body", body),
        ];
        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "twilio".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "twilio".into(),
                reason: format!("Messages API returned {status}: {detail}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSender for TwilioChannel {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, user_key: &str, text: &str) -> Result<(), ChannelError> {
        let chunks = split_message(text, TWILIO_MAX_MESSAGE_LENGTH);
        if chunks.len() > 1 {
            tracing::info!(
                user_key,
                chars = text.chars().count(),
                parts = chunks.len(),
                "Splitting long message"
            );
        }
        for chunk in &chunks {
            self.send_chunk(user_key, chunk).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MediaFetcher for TwilioChannel {
    async fn fetch(&self, media: &MediaAttachment) -> Result<Vec<u8>, ChannelError> {
        let media_err = |reason: String| ChannelError::MediaFailed {
            name: "twilio".into(),
            reason,
        };

        let resp = self
            .client
            .get(&media.url)
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .timeout(MEDIA_DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| media_err(e.to_string()))?
            .error_for_status()
            .map_err(|e| media_err(e.to_string()))?;

        let bytes = resp.bytes().await.map_err(|e| media_err(e.to_string()))?;
        tracing::debug!(url = %media.url, size = bytes.len(), "Media downloaded");
        Ok(bytes.to_vec())
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Paragraphs (blank-line separated) are packed together while they fit.
/// A paragraph that is too long on its own is split on spaces, and a single
/// word longer than the limit is cut.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let len = paragraph.chars().count();
        if len > max_chars {
            flush(&mut chunks, &mut current);
            split_words(paragraph, max_chars, &mut chunks);
        } else if !current.is_empty() && current.chars().count() + 2 + len > max_chars {
            flush(&mut chunks, &mut current);
            current.push_str(paragraph);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
    }
    flush(&mut chunks, &mut current);
    chunks
}

fn split_words(paragraph: &str, max_chars: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();
    let mut current_len = 0;

    for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
        let word_len = word.chars().count();
        if word_len > max_chars {
            flush(chunks, &mut current);
            current_len = 0;
            let chars: Vec<char> = word.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }

        let needed = if current_len == 0 {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if needed <= max_chars {
            if current_len > 0 {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
        } else {
            flush(chunks, &mut current);
            current.push_str(word);
            current_len = word_len;
        }
    }
    flush(chunks, &mut current);
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    let chunk = std::mem::take(current);
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        chunks.push(chunk.to_string());
    }
}
