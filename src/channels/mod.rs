//! Message delivery, media download and speech-to-text.

pub mod channel;
pub mod transcription;
pub mod twilio;

pub use channel::*;
pub use transcription::{DisabledTranscriber, HttpTranscriber, Transcriber, TranscriptionConfig};
pub use twilio::{TwilioChannel, TwilioConfig, split_message};
