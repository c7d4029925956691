/// Whether the caller waits for an utterance to finish before issuing the next one.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum DeliveryMode {
    #[serde(rename = "sync")]
    Sync,
    #[serde(rename = "async")]
    Async,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Sync => "sync",
            DeliveryMode::Async => "async",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct SpeakRequest {
    text: String,
    delivery_mode: DeliveryMode,
}

impl SpeakRequest {
    pub fn new(text: &str, delivery_mode: DeliveryMode) -> Self {
        Self {
            text: text.to_string(),
            delivery_mode,
        }
    }

    pub fn sync(text: &str) -> Self {
        Self::new(text, DeliveryMode::Sync)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }
}
