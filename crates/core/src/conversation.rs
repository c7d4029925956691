use crate::types::{ChatMessage, MessageRole};

/// Append-only message history of one session.
///
/// The persona script is kept apart from the turns so it is always the first
/// message sent and never part of the rendered transcript.
#[derive(Debug, Clone)]
pub struct Conversation {
    system: ChatMessage,
    turns: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system_message: &str) -> Self {
        Self {
            system: ChatMessage::system(system_message),
            turns: Vec::new(),
        }
    }

    pub fn push_user(&mut self, content: &str) {
        self.turns.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.turns.push(ChatMessage::assistant(content));
    }

    /// Everything the backend needs to answer the next turn.
    pub fn request_messages(&self) -> Vec<ChatMessage> {
        std::iter::once(self.system.clone())
            .chain(self.turns.iter().cloned())
            .collect()
    }

    /// Messages a trainee gets to see.
    pub fn transcript(&self) -> impl Iterator<Item = &ChatMessage> {
        self.turns.iter().filter(|message| message.is_visible())
    }

    pub fn assistant_replies(&self) -> impl Iterator<Item = &str> {
        self.turns
            .iter()
            .filter(|message| message.role() == MessageRole::Assistant)
            .map(|message| message.content())
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forgets every turn, keeping the persona.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
