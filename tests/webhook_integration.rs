//! Integration tests for the Twilio webhook and the read-only API.
//!
//! Each test spins up an Axum server on a random port and talks to it over
//! real HTTP, with in-process stand-ins for media download, transcription
//! and the job queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use uuid::Uuid;

use interview_coach::channels::{MediaAttachment, MediaFetcher, MessageSender, Transcriber};
use interview_coach::conversation::{
    AppState, ConversationHandler, ConversationRecord, conversation_routes, prompts,
};
use interview_coach::error::{ChannelError, DatabaseError, JobError};
use interview_coach::store::{MemoryStore, StateStore};
use interview_coach::worker::{Job, JobDispatcher};

/// Maximum time any request is allowed before we consider the test hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const USER: &str = "whatsapp:+5511912345678";
const USER_PATH: &str = "whatsapp%3A%2B5511912345678";

#[derive(Default)]
struct RecordingDispatcher {
    jobs: Mutex<Vec<Job>>,
}

impl JobDispatcher for RecordingDispatcher {
    fn dispatch(&self, job: Job) -> Result<Uuid, JobError> {
        self.jobs.lock().unwrap().push(job);
        Ok(Uuid::new_v4())
    }
}

struct NullSender;

#[async_trait]
impl MessageSender for NullSender {
    fn name(&self) -> &str {
        "null"
    }

    async fn send(&self, _user_key: &str, _text: &str) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Serves fixed bytes, or fails when `fail` is set.
struct StubMedia {
    fail: bool,
}

#[async_trait]
impl MediaFetcher for StubMedia {
    async fn fetch(&self, media: &MediaAttachment) -> Result<Vec<u8>, ChannelError> {
        if self.fail {
            return Err(ChannelError::MediaFailed {
                name: "stub".into(),
                reason: format!("404 for {}", media.url),
            });
        }
        Ok(b"OggS fake voice note".to_vec())
    }
}

/// Returns a fixed transcript.
struct StubTranscriber(&'static str);

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<String, ChannelError> {
        Ok(self.0.to_string())
    }
}

/// Every read fails.
struct BrokenStore;

#[async_trait]
impl StateStore for BrokenStore {
    async fn get(&self, _user_key: &str) -> Result<Option<ConversationRecord>, DatabaseError> {
        Err(DatabaseError::Query("disk I/O error".into()))
    }

    async fn set(&self, _record: &ConversationRecord) -> Result<u64, DatabaseError> {
        Err(DatabaseError::Query("disk I/O error".into()))
    }

    async fn delete(&self, _user_key: &str) -> Result<bool, DatabaseError> {
        Err(DatabaseError::Query("disk I/O error".into()))
    }
}

struct Server {
    base: String,
    dispatcher: Arc<RecordingDispatcher>,
    client: reqwest::Client,
}

async fn start_server(
    store: Arc<dyn StateStore>,
    media: Arc<dyn MediaFetcher>,
    transcriber: Arc<dyn Transcriber>,
) -> Server {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let handler = Arc::new(ConversationHandler::new(
        store,
        dispatcher.clone(),
        Arc::new(NullSender),
    ));
    let app = conversation_routes(AppState {
        handler,
        media,
        transcriber,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        base: format!("http://127.0.0.1:{port}"),
        dispatcher,
        client: reqwest::Client::new(),
    }
}

async fn default_server() -> Server {
    start_server(
        Arc::new(MemoryStore::new()),
        Arc::new(StubMedia { fail: false }),
        Arc::new(StubTranscriber("Oi")),
    )
    .await
}

impl Server {
    async fn post_webhook(&self, fields: &[(&str, &str)]) -> reqwest::Response {
        timeout(
            TEST_TIMEOUT,
            self.client
                .post(format!("{}/webhook/twilio", self.base))
                .form(fields)
                .send(),
        )
        .await
        .expect("webhook timed out")
        .unwrap()
    }

    /// Post a text message and return the reply texts.
    async fn text(&self, body: &str) -> Vec<String> {
        let resp = self.post_webhook(&[("From", USER), ("Body", body)]).await;
        assert_eq!(resp.status(), 200);
        messages(&resp.text().await.unwrap())
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        timeout(TEST_TIMEOUT, self.client.get(format!("{}{path}", self.base)).send())
            .await
            .expect("request timed out")
            .unwrap()
    }
}

/// Pull the `<Message>` bodies out of a TwiML document.
fn messages(twiml: &str) -> Vec<String> {
    twiml
        .split("<Message>")
        .skip(1)
        .filter_map(|part| part.split("</Message>").next())
        .map(|m| {
            m.replace("&lt;", "<")
                .replace("&gt;", ">")
                .replace("&quot;", "\"")
                .replace("&apos;", "'")
                .replace("&amp;", "&")
        })
        .collect()
}

#[tokio::test]
async fn health_reports_ok() {
    let server = default_server().await;
    let resp = server.get("/").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn first_message_gets_onboarding_as_twiml() {
    let server = default_server().await;
    let resp = server
        .post_webhook(&[("From", USER), ("Body", "Olá"), ("NumMedia", "0")])
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/xml"
    );

    let body = resp.text().await.unwrap();
    assert!(body.starts_with("<?xml"));
    assert_eq!(messages(&body), vec![prompts::ONBOARDING]);
}

#[tokio::test]
async fn context_message_dispatches_generation() {
    let server = default_server().await;
    server.text("Oi").await;
    let replies = server.text("Sou enfermeira e quero migrar para TI").await;
    assert_eq!(replies, vec![prompts::CONTEXT_RECEIVED]);

    let jobs = server.dispatcher.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind(), "generate_questions");
    assert_eq!(jobs[0].user_key(), USER);
}

#[tokio::test]
async fn conversation_api_returns_record_or_404() {
    let server = default_server().await;

    let resp = server.get(&format!("/api/conversations/{USER_PATH}")).await;
    assert_eq!(resp.status(), 404);

    server.text("Oi").await;
    let resp = server.get(&format!("/api/conversations/{USER_PATH}")).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["user_key"], USER);
    assert_eq!(body["step"], "awaiting_context");
}

#[tokio::test]
async fn voice_note_is_transcribed_and_handled() {
    let server = default_server().await;
    let resp = server
        .post_webhook(&[
            ("From", USER),
            ("Body", ""),
            ("NumMedia", "1"),
            ("MediaUrl0", "https://api.twilio.com/2010-04-01/Media/ME1"),
        ])
        .await;
    let replies = messages(&resp.text().await.unwrap());
    assert_eq!(replies, vec![prompts::AUDIO_RECEIVED, prompts::ONBOARDING]);
}

#[tokio::test]
async fn failed_media_download_is_reported() {
    let store = Arc::new(MemoryStore::new());
    let server = start_server(
        store.clone(),
        Arc::new(StubMedia { fail: true }),
        Arc::new(StubTranscriber("Oi")),
    )
    .await;

    let resp = server
        .post_webhook(&[
            ("From", USER),
            ("NumMedia", "1"),
            ("MediaUrl0", "https://api.twilio.com/2010-04-01/Media/ME2"),
        ])
        .await;
    let replies = messages(&resp.text().await.unwrap());
    assert_eq!(replies, vec![prompts::AUDIO_RECEIVED, prompts::AUDIO_NOT_PROCESSED]);
    // The conversation was never touched.
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn empty_transcript_is_not_understood() {
    let server = start_server(
        Arc::new(MemoryStore::new()),
        Arc::new(StubMedia { fail: false }),
        Arc::new(StubTranscriber("   ")),
    )
    .await;

    let resp = server
        .post_webhook(&[
            ("From", USER),
            ("NumMedia", "1"),
            ("MediaUrl0", "https://api.twilio.com/2010-04-01/Media/ME3"),
        ])
        .await;
    let replies = messages(&resp.text().await.unwrap());
    assert_eq!(replies, vec![prompts::AUDIO_RECEIVED, prompts::AUDIO_NOT_UNDERSTOOD]);
}

#[tokio::test]
async fn storage_failure_still_answers() {
    let server = start_server(
        Arc::new(BrokenStore),
        Arc::new(StubMedia { fail: false }),
        Arc::new(StubTranscriber("Oi")),
    )
    .await;

    let replies = server.text("Oi").await;
    assert_eq!(replies, vec![prompts::SERVICE_UNAVAILABLE]);

    let resp = server.get(&format!("/api/conversations/{USER_PATH}")).await;
    assert_eq!(resp.status(), 500);
}
