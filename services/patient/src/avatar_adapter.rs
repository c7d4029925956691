//! Voices the patient through a streaming-avatar REST API.
//!
//! One avatar session is created per patient session. Every call after
//! `streaming.new` carries the avatar session id, and `stop` closes it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use virtual_patient_core::speaker::Speaker;
use virtual_patient_core::types::{DeliveryMode, SpeakRequest};

const API_KEY_HEADER: &str = "x-api-key";
const API_VERSION: &str = "v1";
const AVATAR_QUALITY: &str = "low";
const VOICE_RATE: f32 = 1.2;
const SESSION_VERSION: &str = "v2";
/// Speaks the given text verbatim instead of answering it.
const TASK_TYPE_REPEAT: &str = "repeat";

#[derive(Debug, Serialize)]
struct NewSessionRequest<'a> {
    quality: &'a str,
    avatar_name: &'a str,
    voice: VoiceSettings,
    version: &'a str,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    rate: f32,
}

#[derive(Debug, Deserialize)]
struct NewSessionResponse {
    data: NewSessionData,
}

#[derive(Debug, Deserialize)]
struct NewSessionData {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TaskRequest<'a> {
    session_id: &'a str,
    text: &'a str,
    task_type: &'a str,
    task_mode: DeliveryMode,
}

pub struct AvatarSpeaker {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    session_id: String,
}

impl AvatarSpeaker {
    /// Creates an avatar session for `avatar_id` and starts streaming it.
    pub async fn start(base_url: &str, api_key: SecretString, avatar_id: &str) -> Result<Self> {
        let http = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();

        let body = NewSessionRequest {
            quality: AVATAR_QUALITY,
            avatar_name: avatar_id,
            voice: VoiceSettings { rate: VOICE_RATE },
            version: SESSION_VERSION,
        };
        let response = http
            .post(endpoint(&base_url, "streaming.new"))
            .header(API_KEY_HEADER, api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Failed to reach the avatar API")?
            .error_for_status()
            .context("Avatar API refused to create a session")?
            .json::<NewSessionResponse>()
            .await
            .context("Unexpected response from streaming.new")?;

        let speaker = Self {
            http,
            base_url,
            api_key,
            session_id: response.data.session_id,
        };
        speaker.session_call("streaming.start").await?;
        tracing::info!("Avatar {} streaming in session {}", avatar_id, speaker.session_id);
        Ok(speaker)
    }

    async fn post<T: Serialize + ?Sized>(&self, action: &str, body: &T) -> Result<()> {
        self.http
            .post(endpoint(&self.base_url, action))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {action}"))?
            .error_for_status()
            .with_context(|| format!("Avatar API rejected {action}"))?;
        Ok(())
    }

    async fn session_call(&self, action: &str) -> Result<()> {
        let body = SessionRequest {
            session_id: &self.session_id,
        };
        self.post(action, &body).await
    }
}

#[async_trait]
impl Speaker for AvatarSpeaker {
    async fn speak(&self, request: SpeakRequest) -> Result<()> {
        let body = task_request(&self.session_id, &request);
        self.post("streaming.task", &body).await
    }

    async fn interrupt(&self) -> Result<()> {
        self.session_call("streaming.interrupt").await
    }

    async fn stop(&self) -> Result<()> {
        self.session_call("streaming.stop").await?;
        tracing::info!("Avatar session {} stopped", self.session_id);
        Ok(())
    }
}

fn endpoint(base_url: &str, action: &str) -> String {
    format!("{base_url}/{API_VERSION}/{action}")
}

fn task_request<'a>(session_id: &'a str, request: &'a SpeakRequest) -> TaskRequest<'a> {
    TaskRequest {
        session_id,
        text: request.text(),
        task_type: TASK_TYPE_REPEAT,
        task_mode: request.delivery_mode(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_body_carries_delivery_mode() {
        let request = SpeakRequest::new("It hurts when I breathe in.", DeliveryMode::Async);
        let body = serde_json::to_value(task_request("sess-9", &request)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "session_id": "sess-9",
                "text": "It hurts when I breathe in.",
                "task_type": "repeat",
                "task_mode": "async",
            })
        );
    }

    #[test]
    fn test_new_session_body() {
        let body = NewSessionRequest {
            quality: AVATAR_QUALITY,
            avatar_name: "Wayne_20240711",
            voice: VoiceSettings { rate: VOICE_RATE },
            version: SESSION_VERSION,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["avatar_name"], "Wayne_20240711");
        assert_eq!(json["quality"], "low");
        assert!((json["voice"]["rate"].as_f64().unwrap() - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_parses_session_id() {
        let json = r#"{"code": 100, "data": {"session_id": "abc", "url": "wss://x"}, "message": "success"}"#;
        let response: NewSessionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.session_id, "abc");
    }

    #[test]
    fn test_endpoint_joins_version() {
        assert_eq!(
            endpoint("https://api.heygen.com", "streaming.task"),
            "https://api.heygen.com/v1/streaming.task"
        );
    }
}
