#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct TranscriptionResponse {
    /// The text recognised in the uploaded recording
    transcription: String,
}

impl TranscriptionResponse {
    pub fn new(transcription: &str) -> Self {
        Self {
            transcription: transcription.to_string(),
        }
    }

    pub fn transcription(&self) -> &str {
        &self.transcription
    }

    pub fn into_transcription(self) -> String {
        self.transcription
    }
}
