//! Conversation history

use avatar_core::{ChatMessage, ChatRole};

/// Ordered role-tagged history sent with every request.
///
/// The system prompt, if any, always comes first and survives `clear`.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    system: Option<ChatMessage>,
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system: Some(ChatMessage::system(prompt)),
            messages: Vec::new(),
        }
    }

    /// Record the user's message before the request goes out
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    /// Record the assistant's full reply after end-of-stream
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Messages in request order
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.system
            .iter()
            .chain(self.messages.iter())
            .cloned()
            .collect()
    }

    /// Turns recorded so far, system prompt excluded
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_role(&self) -> Option<ChatRole> {
        self.messages.last().map(|m| m.role)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_order() {
        let mut history = ConversationHistory::with_system_prompt("Be brief.");
        history.push_user("Hi");
        history.push_assistant("Hello!");

        let messages = history.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1], ChatMessage::user("Hi"));
        assert_eq!(history.last_role(), Some(ChatRole::Assistant));
    }

    #[test]
    fn test_clear_keeps_system_prompt() {
        let mut history = ConversationHistory::with_system_prompt("Be brief.");
        history.push_user("Hi");
        history.clear();

        assert!(history.is_empty());
        assert_eq!(history.messages().len(), 1);
    }
}
