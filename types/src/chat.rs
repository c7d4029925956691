use crate::message::ChatMessage;

/// Body of a `generate-response` call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ChatRequest {
    messages: Vec<ChatMessage>,

    /// Backend conversation id, `null` on the first turn
    session_id: Option<String>,

    /// Whether the backend should answer with newline-delimited `{"chunk": ...}` lines
    stream: bool,
}

impl ChatRequest {
    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::new()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn stream(&self) -> bool {
        self.stream
    }
}

pub struct ChatRequestBuilder {
    request: ChatRequest,
}

impl Default for ChatRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: ChatRequest {
                messages: Vec::new(),
                session_id: None,
                stream: false,
            },
        }
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.request.messages.push(message);
        self
    }

    pub fn with_messages<I: IntoIterator<Item = ChatMessage>>(mut self, messages: I) -> Self {
        self.request.messages.extend(messages);
        self
    }

    pub fn with_session_id(mut self, session_id: Option<&str>) -> Self {
        self.request.session_id = session_id.map(str::to_string);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.request.stream = stream;
        self
    }

    pub fn build(self) -> ChatRequest {
        self.request
    }
}

/// Non-streamed reply of the backend.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ChatResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    session_id: Option<String>,
}

impl ChatResponse {
    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

/// One decoded line of a streamed reply.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct StreamFragment {
    chunk: String,
}

impl StreamFragment {
    pub fn new(chunk: &str) -> Self {
        Self {
            chunk: chunk.to_string(),
        }
    }

    pub fn chunk(&self) -> &str {
        &self.chunk
    }

    pub fn into_chunk(self) -> String {
        self.chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_turn_request_sends_null_session() {
        let request = ChatRequest::builder()
            .with_message(ChatMessage::system("Session initialized"))
            .build();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["session_id"], serde_json::Value::Null);
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_fragment_requires_chunk_field() {
        assert!(serde_json::from_str::<StreamFragment>(r#"{"text": "hi"}"#).is_err());
        let fragment: StreamFragment = serde_json::from_str(r#"{"chunk": "hi"}"#).unwrap();
        assert_eq!(fragment.chunk(), "hi");
    }

    #[test]
    fn test_response_tolerates_missing_session_id() {
        let response: ChatResponse = serde_json::from_str(r#"{"response": "Hello"}"#).unwrap();
        assert_eq!(response.response(), "Hello");
        assert!(response.session_id().is_none());
    }
}
