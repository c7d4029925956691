//! Application Configuration Module
//!
//! Loads the service settings from environment variables (and `.env` during
//! local development) into a single struct built once at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use secrecy::SecretString;
use tracing::Level;
use virtual_patient_core::chunker::{ChunkPolicy, DEFAULT_MAX_CHARS, DEFAULT_MIN_CHARS};
use virtual_patient_core::session::SessionSettings;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_AVATAR_API_URL: &str = "https://api.heygen.com";
pub const DEFAULT_SESSION_MINUTES: u64 = 15;

/// How patient replies are voiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechMode {
    /// Chunks are printed as they would be spoken.
    Console,
    /// Chunks are sent to the streaming avatar.
    Avatar,
    /// Text chat only.
    None,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub speech_mode: SpeechMode,
    pub avatar_api_url: String,
    pub avatar_api_key: Option<SecretString>,
    pub avatar_id: Option<String>,
    pub session_minutes: u64,
    pub chunk_min_chars: usize,
    pub chunk_max_chars: usize,
    pub personas_dir: Option<PathBuf>,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid speech mode provided for SPEECH_MODE: {0}")]
    InvalidSpeechMode(String),
    #[error("Invalid number provided for {name}: {value}")]
    InvalidNumber { name: String, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `BACKEND_URL`: (Optional) The conversation backend. Defaults to "http://localhost:8000".
    // *   `SPEECH_MODE`: (Optional) "console", "avatar" or "none". Defaults to "console".
    // *   `AVATAR_API_URL`: (Optional) The streaming avatar API. Defaults to "https://api.heygen.com".
    // *   `AVATAR_API_KEY`: Required when `SPEECH_MODE` is "avatar".
    // *   `AVATAR_ID`: (Optional) Overrides the avatar of every patient.
    // *   `SESSION_MINUTES`: (Optional) Length of a session. Defaults to 15.
    // *   `CHUNK_MIN_CHARS` / `CHUNK_MAX_CHARS`: (Optional) Chunking thresholds. Default to 15 / 50.
    // *   `PERSONAS_DIR`: (Optional) A directory of extra patient `.json` files.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend_url = lookup("BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let mode = lookup("SPEECH_MODE").unwrap_or_else(|| "console".to_string());
        let speech_mode = match mode.to_lowercase().as_str() {
            "console" => SpeechMode::Console,
            "avatar" => SpeechMode::Avatar,
            "none" | "text" => SpeechMode::None,
            _ => return Err(ConfigError::InvalidSpeechMode(mode)),
        };

        let avatar_api_url =
            lookup("AVATAR_API_URL").unwrap_or_else(|| DEFAULT_AVATAR_API_URL.to_string());
        let avatar_api_key = lookup("AVATAR_API_KEY").map(SecretString::from);
        let avatar_id = lookup("AVATAR_ID");

        let session_minutes = number(&lookup, "SESSION_MINUTES", DEFAULT_SESSION_MINUTES)?;
        let chunk_min_chars = number(&lookup, "CHUNK_MIN_CHARS", DEFAULT_MIN_CHARS)?;
        let chunk_max_chars = number(&lookup, "CHUNK_MAX_CHARS", DEFAULT_MAX_CHARS)?;
        let personas_dir = lookup("PERSONAS_DIR").map(PathBuf::from);

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        if speech_mode == SpeechMode::Avatar && avatar_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "AVATAR_API_KEY must be set for avatar speech mode".to_string(),
            ));
        }

        Ok(Self {
            backend_url,
            speech_mode,
            avatar_api_url,
            avatar_api_key,
            avatar_id,
            session_minutes,
            chunk_min_chars,
            chunk_max_chars,
            personas_dir,
            log_level,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            budget: Duration::from_secs(self.session_minutes * 60),
            chunk_policy: ChunkPolicy::new(self.chunk_min_chars, self.chunk_max_chars),
        }
    }
}

fn number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            name: name.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.speech_mode, SpeechMode::Console);
        assert_eq!(config.log_level, Level::INFO);

        let settings = config.session_settings();
        assert_eq!(settings.budget, Duration::from_secs(15 * 60));
        assert_eq!(settings.chunk_policy, ChunkPolicy::default());
    }

    #[test]
    fn test_avatar_mode_requires_key() {
        let err = config_from(&[("SPEECH_MODE", "avatar")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));

        let config = config_from(&[("SPEECH_MODE", "Avatar"), ("AVATAR_API_KEY", "secret")]).unwrap();
        assert_eq!(config.speech_mode, SpeechMode::Avatar);
        assert!(config.avatar_api_key.is_some());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            config_from(&[("SPEECH_MODE", "radio")]),
            Err(ConfigError::InvalidSpeechMode(_))
        ));
        assert!(matches!(
            config_from(&[("SESSION_MINUTES", "ten")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[("RUST_LOG", "loud")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
