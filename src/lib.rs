//! Interview Coach: conversation state machine and background generation
//! for a WhatsApp interview-practice assistant.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod logging;
pub mod store;
pub mod worker;
