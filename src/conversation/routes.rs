//! HTTP surface: the Twilio webhook plus a couple of read-only endpoints.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::channels::{InboundMessage, MediaFetcher, Transcriber};
use crate::conversation::{ConversationHandler, prompts};

/// Shared state for the conversation routes.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<ConversationHandler>,
    pub media: Arc<dyn MediaFetcher>,
    pub transcriber: Arc<dyn Transcriber>,
}

/// Build the router for the webhook and API endpoints.
pub fn conversation_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook/twilio", post(twilio_webhook))
        .route("/api/conversations/{user_key}", get(get_conversation))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Fields Twilio posts for an inbound WhatsApp message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioWebhook {
    pub from: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub num_media: u32,
    #[serde(default, rename = "MediaUrl0")]
    pub media_url0: Option<String>,
}

impl TwilioWebhook {
    pub fn into_inbound(self) -> InboundMessage {
        let message = InboundMessage::text(self.from, self.body.unwrap_or_default());
        match self.media_url0.filter(|url| self.num_media > 0 && !url.is_empty()) {
            Some(url) => message.with_media(url),
            None => message,
        }
    }
}

async fn twilio_webhook(
    State(state): State<AppState>,
    Form(form): Form<TwilioWebhook>,
) -> Response {
    let inbound = form.into_inbound();
    let user_key = inbound.user_key.clone();
    tracing::info!(
        user_key = %user_key,
        body_length = inbound.text.chars().count(),
        has_media = inbound.media.is_some(),
        "Webhook received"
    );

    let mut messages: Vec<String> = Vec::new();
    let mut text = inbound.text.trim().to_string();

    if let Some(media) = &inbound.media {
        messages.push(prompts::AUDIO_RECEIVED.to_string());
        let audio = match state.media.fetch(media).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!(user_key = %user_key, error = %e, "Media download failed");
                messages.push(prompts::AUDIO_NOT_PROCESSED.to_string());
                return twiml(&messages);
            }
        };
        match state.transcriber.transcribe(audio).await {
            Ok(transcript) if !transcript.trim().is_empty() => {
                text = transcript.trim().to_string();
                tracing::info!(user_key = %user_key, chars = text.chars().count(), "Audio transcribed");
            }
            Ok(_) => {
                tracing::warn!(user_key = %user_key, "Empty transcription");
                messages.push(prompts::AUDIO_NOT_UNDERSTOOD.to_string());
                return twiml(&messages);
            }
            Err(e) => {
                tracing::warn!(user_key = %user_key, error = %e, "Transcription failed");
                messages.push(prompts::AUDIO_NOT_UNDERSTOOD.to_string());
                return twiml(&messages);
            }
        }
    }

    match state.handler.handle_message(&user_key, &text).await {
        Ok(replies) => messages.extend(replies),
        Err(e) => {
            tracing::error!(user_key = %user_key, error = %e, "Failed to process message");
            messages.push(prompts::SERVICE_UNAVAILABLE.to_string());
        }
    }
    twiml(&messages)
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(user_key): Path<String>,
) -> impl IntoResponse {
    match state.handler.store().get(&user_key).await {
        Ok(Some(record)) => (StatusCode::OK, Json(serde_json::json!(record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Conversation not found"})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// Render replies as a TwiML messaging response.
fn twiml(messages: &[String]) -> Response {
    let mut body = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
    for message in messages.iter().filter(|m| !m.trim().is_empty()) {
        body.push_str("<Message>");
        body.push_str(&xml_escape(message));
        body.push_str("</Message>");
    }
    body.push_str("</Response>");
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
