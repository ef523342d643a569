//! The interview conversation: steps, the record, the transition function
//! and the handler that runs it against storage and background jobs.

pub mod handler;
pub mod keywords;
pub mod machine;
pub mod model;
pub mod prompts;
pub mod routes;
pub mod state;

pub use handler::ConversationHandler;
pub use machine::{JobRequest, Transition, transition};
pub use model::{ConversationRecord, QUESTION_COUNT};
pub use routes::{AppState, conversation_routes};
pub use state::Step;
