use std::pin::Pin;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
#[cfg(test)]
use mockall::automock;
use crate::types::ChatRequest;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// An opened streaming reply.
pub struct TurnStream {
    /// Conversation id announced before the body, if any.
    pub session_id: Option<String>,
    pub body: ByteStream,
}

/// The HTTP service that owns the language model, conversation state and transcription.
///
/// `open_stream` must fail when the backend answers with a non-success status;
/// the returned body carries only transport errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Asks for a fresh conversation id.
    async fn start_session(&self) -> Result<Option<String>>;

    async fn open_stream(&self, request: ChatRequest) -> Result<TurnStream>;

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: String,
        session_id: Option<String>,
    ) -> Result<String>;
}
