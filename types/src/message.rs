#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The role of the message sender: "system", "user", "assistant"
    role: MessageRole,

    /// The text of the message
    content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }

    pub fn system(content: &str) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn role(&self) -> MessageRole {
        self.role.clone()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// System messages carry persona instructions and are never shown in a transcript.
    pub fn is_visible(&self) -> bool {
        self.role != MessageRole::System
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub enum MessageRole {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}
