pub mod chat;
pub mod speech;
pub mod transcription;
mod message;

pub use chat::{ChatRequest, ChatResponse, StreamFragment};
pub use message::*;
pub use speech::{DeliveryMode, SpeakRequest};
pub use transcription::TranscriptionResponse;
