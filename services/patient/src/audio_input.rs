use anyhow::{Context, Result};
use std::path::Path;

/// Reads recordings for transcription.
///
/// Once a recording cannot be read, recording stays disabled and every plain
/// read is refused until a retry succeeds.
#[derive(Debug, Default)]
pub struct AudioInput {
    unavailable: Option<String>,
}

impl AudioInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    /// Short status to show while recording is disabled.
    pub fn indicator(&self) -> Option<String> {
        self.unavailable
            .as_ref()
            .map(|reason| format!("recording unavailable: {reason}"))
    }

    /// Reads the recording at `path`. `retry` allows a read while recording is disabled.
    pub async fn read(&mut self, path: &Path, retry: bool) -> Result<Vec<u8>> {
        if let Some(reason) = &self.unavailable {
            if !retry {
                anyhow::bail!(
                    "Recording is disabled ({reason}). Use /retry-audio <file> once it is available again."
                );
            }
        }

        match tokio::fs::read(path).await {
            Ok(audio) => {
                if self.unavailable.take().is_some() {
                    tracing::info!("Recording available again");
                }
                Ok(audio)
            }
            Err(e) => {
                let reason = match e.kind() {
                    std::io::ErrorKind::PermissionDenied => "permission denied".to_string(),
                    std::io::ErrorKind::NotFound => "no such recording".to_string(),
                    _ => e.to_string(),
                };
                tracing::warn!("Recording disabled: {} ({})", reason, path.display());
                self.unavailable = Some(reason);
                Err(e).with_context(|| format!("Failed to read audio file: {}", path.display()))
            }
        }
    }
}
