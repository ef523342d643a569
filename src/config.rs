//! Runtime configuration, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::{TranscriptionConfig, TwilioConfig};
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::worker::PoolConfig;

const DEFAULT_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Where conversation state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Memory,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    /// Upper bound on a single generation call.
    pub generation_timeout: Duration,
    pub queue_capacity: usize,
    pub pool: PoolConfig,
    pub twilio: TwilioConfig,
    /// `None` disables voice-note transcription.
    pub transcription: Option<TranscriptionConfig>,
    /// Directory for JSON log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(ConfigError::InvalidValue {
                    key: ".env".into(),
                    message: e.to_string(),
                });
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let storage = match env.get("COACH_DB_PATH") {
            Some(path) if path == ":memory:" => StorageConfig::Memory,
            Some(path) => StorageConfig::File(PathBuf::from(path)),
            None => StorageConfig::File(PathBuf::from("./data/interview-coach.db")),
        };

        let llm = LlmConfig {
            backend: env.parse_or("LLM_BACKEND", LlmBackend::Anthropic)?,
            api_key: SecretString::from(env.require("LLM_API_KEY")?),
            model: env
                .get("LLM_MODEL")
                .unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
        };

        let twilio = TwilioConfig {
            account_sid: env.require("TWILIO_ACCOUNT_SID")?,
            auth_token: SecretString::from(env.require("TWILIO_AUTH_TOKEN")?),
            from_number: env.require("TWILIO_WHATSAPP_NUMBER")?,
            api_base: env
                .get("TWILIO_API_BASE")
                .unwrap_or_else(|| "https://api.twilio.com".to_string()),
        };

        let transcription = env.get("TRANSCRIPTION_API_KEY").map(|key| TranscriptionConfig {
            url: env
                .get("TRANSCRIPTION_URL")
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_URL.to_string()),
            api_key: SecretString::from(key),
            model: env
                .get("TRANSCRIPTION_MODEL")
                .unwrap_or_else(|| "whisper-1".to_string()),
            language: env
                .get("TRANSCRIPTION_LANGUAGE")
                .unwrap_or_else(|| "pt".to_string()),
        });

        let workers: usize = env.parse_or("WORKER_COUNT", 4)?;
        let max_attempts: u32 = env.parse_or("JOB_MAX_ATTEMPTS", 3)?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WORKER_COUNT".into(),
                message: "must be at least 1".into(),
            });
        }
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "JOB_MAX_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            port: env.parse_or("COACH_PORT", 8000)?,
            storage,
            llm,
            generation_timeout: Duration::from_secs(env.parse_or("GENERATION_TIMEOUT_SECS", 60)?),
            queue_capacity: env.parse_or("JOB_QUEUE_CAPACITY", 256)?,
            pool: PoolConfig {
                workers,
                max_attempts,
                retry_backoff: Duration::from_millis(env.parse_or("JOB_RETRY_BACKOFF_MS", 2000)?),
            },
            twilio,
            transcription,
            log_dir: env.get("COACH_LOG_DIR").map(PathBuf::from),
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        }
    }
}
