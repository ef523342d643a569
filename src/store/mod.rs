//! Conversation state storage.
//!
//! One record per `user_key`, written with a version check so the request
//! handler and the generation workers cannot silently overwrite each other.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::StateStore;
