use std::io::Write;
use std::sync::Mutex;
use anyhow::Result;
use async_trait::async_trait;
use virtual_patient_core::speaker::Speaker;
use virtual_patient_core::types::{DeliveryMode, SpeakRequest};

/// Prints each utterance on its own line, prefixed with the speaker's name.
pub struct ConsoleSpeaker<W: Write + Send> {
    name: String,
    out: Mutex<W>,
}

impl ConsoleSpeaker<std::io::Stdout> {
    pub fn stdout(name: &str) -> Self {
        Self::new(name, std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleSpeaker<W> {
    pub fn new(name: &str, out: W) -> Self {
        Self {
            name: name.to_string(),
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("console writer poisoned"))?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> Speaker for ConsoleSpeaker<W> {
    async fn speak(&self, request: SpeakRequest) -> Result<()> {
        let marker = match request.delivery_mode() {
            DeliveryMode::Sync => "»",
            DeliveryMode::Async => " ",
        };
        self.write_line(&format!("{marker} {}: {}", self.name, request.text()))
    }

    async fn interrupt(&self) -> Result<()> {
        self.write_line(&format!("  ({} stops talking)", self.name))
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_speaks_each_chunk_on_its_own_line() {
        let speaker = ConsoleSpeaker::new("Sarah", Vec::new());
        speaker.speak(SpeakRequest::sync("It started on Monday,")).await.unwrap();
        speaker
            .speak(SpeakRequest::new("right after dinner.", DeliveryMode::Async))
            .await
            .unwrap();

        let out = String::from_utf8(speaker.out.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "» Sarah: It started on Monday,\n  Sarah: right after dinner.\n"
        );
    }
}
