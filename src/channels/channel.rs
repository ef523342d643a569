//! Messaging seams used by the handler and the webhook.

use async_trait::async_trait;

use crate::error::ChannelError;

/// A message as it arrives from the messaging provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Provider address of the sender, used as the conversation key.
    pub user_key: String,
    pub text: String,
    pub media: Option<MediaAttachment>,
}

impl InboundMessage {
    pub fn text(user_key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            text: text.into(),
            media: None,
        }
    }

    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        self.media = Some(MediaAttachment { url: url.into() });
        self
    }
}

/// A media item attached to an inbound message (voice notes, in practice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub url: String,
}

/// Push a message to a user outside the request/response cycle.
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, user_key: &str, text: &str) -> Result<(), ChannelError>;
}

/// Download an inbound media attachment.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, media: &MediaAttachment) -> Result<Vec<u8>, ChannelError>;
}
