use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use virtual_patient::types::{ChatMessage, ChatRequest, ChatResponse, TranscriptionResponse};
use virtual_patient::ChatStream;
use virtual_patient_core::backend::{ChatBackend, TurnStream};
use virtual_patient_core::SESSION_INIT_MESSAGE;

/// The calls the adapter needs from the backend HTTP client.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse>;
    async fn generate_stream(&self, request: ChatRequest) -> Result<ChatStream>;
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: String,
        session_id: Option<String>,
    ) -> Result<TranscriptionResponse>;
}

#[async_trait]
impl BackendClient for virtual_patient::Client {
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse> {
        Ok(virtual_patient::Client::generate(self, &request).await?)
    }

    async fn generate_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        Ok(virtual_patient::Client::generate_stream(self, &request).await?)
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: String,
        session_id: Option<String>,
    ) -> Result<TranscriptionResponse> {
        Ok(virtual_patient::Client::transcribe(self, audio, &file_name, session_id.as_deref()).await?)
    }
}

/// Implements `ChatBackend` on top of the backend HTTP client.
pub struct BackendAdapter<C: BackendClient> {
    client: C,
}

impl BackendAdapter<virtual_patient::Client> {
    pub fn connect(backend_url: &str) -> Result<Self> {
        let config = virtual_patient::Config::builder()
            .with_base_url(backend_url)
            .build();
        let client = virtual_patient::connect_with_config(config)
            .context("Failed to create backend client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl<C: BackendClient> ChatBackend for BackendAdapter<C> {
    async fn start_session(&self) -> Result<Option<String>> {
        let request = ChatRequest::builder()
            .with_message(ChatMessage::system(SESSION_INIT_MESSAGE))
            .build();
        let response = self
            .client
            .generate(request)
            .await
            .context("Failed to initialise backend session")?;
        Ok(response.session_id().map(str::to_string))
    }

    async fn open_stream(&self, request: ChatRequest) -> Result<TurnStream> {
        let stream = self.client.generate_stream(request).await?;
        let (session_id, body) = stream.into_parts();
        Ok(TurnStream {
            session_id,
            body: Box::pin(body.map_err(anyhow::Error::from)),
        })
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: String,
        session_id: Option<String>,
    ) -> Result<String> {
        let response = self
            .client
            .transcribe(audio, file_name, session_id)
            .await
            .context("Failed to transcribe recording")?;
        Ok(response.into_transcription())
    }
}
