use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use interview_coach::channels::{
    DisabledTranscriber, HttpTranscriber, MediaFetcher, MessageSender, Transcriber, TwilioChannel,
};
use interview_coach::config::{AppConfig, StorageConfig};
use interview_coach::conversation::{AppState, ConversationHandler, conversation_routes};
use interview_coach::llm::create_provider;
use interview_coach::logging;
use interview_coach::store::{LibSqlBackend, MemoryStore, StateStore};
use interview_coach::worker::{GenerationWorker, JobDispatcher, WorkerPool, job_queue};

/// Extra time given to in-flight generations after the server stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    let _log_guard = logging::init(config.log_dir.as_deref());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %config.llm.model,
        port = config.port,
        "Interview coach starting"
    );

    // ── Storage ─────────────────────────────────────────────────────────
    let store: Arc<dyn StateStore> = match &config.storage {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory store, conversations will not survive a restart");
            Arc::new(MemoryStore::new())
        }
        StorageConfig::File(path) => {
            tracing::info!(path = %path.display(), "Opening database");
            Arc::new(
                LibSqlBackend::new_local(path)
                    .await
                    .with_context(|| format!("failed to open database at {}", path.display()))?,
            )
        }
    };

    // ── Generation ──────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let (dispatcher, rx) = job_queue(config.queue_capacity);
    let worker = Arc::new(GenerationWorker::new(
        store.clone(),
        llm,
        config.generation_timeout,
    ));
    let pool = WorkerPool::spawn(worker, rx, dispatcher.downgrade(), config.pool.clone());
    let queue_capacity = dispatcher.capacity();
    let dispatcher: Arc<dyn JobDispatcher> = Arc::new(dispatcher);

    // ── Channels ────────────────────────────────────────────────────────
    let twilio = Arc::new(TwilioChannel::new(config.twilio.clone()));
    let sender: Arc<dyn MessageSender> = twilio.clone();
    let media: Arc<dyn MediaFetcher> = twilio;
    let transcriber: Arc<dyn Transcriber> = match config.transcription.clone() {
        Some(t) => {
            tracing::info!(model = %t.model, language = %t.language, "Audio transcription enabled");
            Arc::new(HttpTranscriber::new(t))
        }
        None => {
            tracing::warn!("TRANSCRIPTION_API_KEY not set, voice notes will not be transcribed");
            Arc::new(DisabledTranscriber)
        }
    };

    // ── HTTP ────────────────────────────────────────────────────────────
    let handler = Arc::new(ConversationHandler::new(store, dispatcher, sender));
    let app = conversation_routes(AppState {
        handler,
        media,
        transcriber,
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        addr = %addr,
        workers = pool.size(),
        queue_capacity,
        "Webhook listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router held the last dispatcher; the queue is closed now.
    let grace = config.generation_timeout + SHUTDOWN_GRACE;
    if tokio::time::timeout(grace, pool.join()).await.is_err() {
        tracing::warn!("Workers still busy at shutdown, abandoning pending jobs");
    }
    tracing::info!("Interview coach stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
