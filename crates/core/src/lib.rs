pub mod backend;
pub mod chunker;
pub mod conversation;
pub mod error;
pub mod persona;
pub mod session;
pub mod speaker;
pub mod speech_queue;
pub mod stream_reader;

pub use virtual_patient_types as types;

/// Spoken by an active avatar when a turn cannot be completed.
pub const APOLOGY_MESSAGE: &str = "Sorry, I encountered an error processing your request.";

/// Sent as the only message when asking the backend for a new conversation id.
pub const SESSION_INIT_MESSAGE: &str = "Session initialized";
