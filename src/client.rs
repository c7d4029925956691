use std::pin::Pin;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::multipart::{Form, Part};
use crate::client::consts::{AUDIO_FIELD, GENERATE_RESPONSE_PATH, SESSION_ID_FIELD, TRANSCRIBE_PATH};
use crate::types::{ChatRequest, ChatResponse, TranscriptionResponse};

pub mod config;
mod consts;
mod utils;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend answered with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// A streamed reply whose status has already been checked.
pub struct ChatStream {
    session_id: Option<String>,
    body: ByteStream,
}

impl ChatStream {
    pub fn new(session_id: Option<String>, body: ByteStream) -> Self {
        Self { session_id, body }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn into_parts(self) -> (Option<String>, ByteStream) {
        (self.session_id, self.body)
    }
}

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    config: config::Config,
}

impl Client {
    fn new(config: config::Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<reqwest::Response, ClientError> {
        let url = utils::endpoint(&self.config, GENERATE_RESPONSE_PATH);
        tracing::debug!(
            "POST {} messages={} stream={}",
            url,
            request.messages().len(),
            request.stream()
        );
        let response = self.http.post(&url).json(request).send().await?;
        check_status(response).await
    }

    /// Sends a turn and waits for the whole reply.
    pub async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let response = self.post_chat(request).await?;
        Ok(response.json::<ChatResponse>().await?)
    }

    /// Sends a turn and hands back the raw body as it arrives.
    pub async fn generate_stream(&self, request: &ChatRequest) -> Result<ChatStream, ClientError> {
        let response = self.post_chat(request).await?;
        let session_id = utils::session_id_from_headers(response.headers());
        let body = response.bytes_stream().map_err(ClientError::from);
        Ok(ChatStream {
            session_id,
            body: Box::pin(body),
        })
    }

    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        session_id: Option<&str>,
    ) -> Result<TranscriptionResponse, ClientError> {
        let url = utils::endpoint(&self.config, TRANSCRIBE_PATH);
        let mut form = Form::new().part(AUDIO_FIELD, Part::bytes(audio).file_name(file_name.to_string()));
        if let Some(session_id) = session_id {
            form = form.text(SESSION_ID_FIELD, session_id.to_string());
        }
        tracing::debug!("POST {} file={}", url, file_name);
        let response = self.http.post(&url).multipart(form).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<TranscriptionResponse>().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

pub fn connect_with_config(config: config::Config) -> Result<Client, ClientError> {
    Client::new(config)
}

pub fn connect() -> Result<Client, ClientError> {
    let config = config::Config::new();
    connect_with_config(config)
}
