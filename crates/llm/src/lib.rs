//! Chat sources for the talking avatar
//!
//! Features:
//! - Incremental token streams from an OpenAI-compatible endpoint
//! - Scripted replies for offline runs and tests
//! - Role-tagged conversation history

pub mod history;
pub mod openai;
pub mod scripted;
pub mod streaming;

pub use history::ConversationHistory;
pub use openai::OpenAiChatSource;
pub use scripted::ScriptedChatSource;
pub use streaming::{token_channel, ReplyBuilder, TokenSender, TokenStream};

use async_trait::async_trait;
use avatar_core::ChatMessage;
use thiserror::Error;

/// LLM errors
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Stream decode error: {0}")]
    Decode(String),

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<LlmError> for avatar_core::Error {
    fn from(err: LlmError) -> Self {
        avatar_core::Error::Llm(err.to_string())
    }
}

/// A chat model that answers with an incremental stream of text fragments
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Start a reply to `history` (the last message is the new user turn).
    ///
    /// The stream yields fragments in order and ends at end-of-reply.
    async fn stream_reply(&self, history: &[ChatMessage]) -> Result<TokenStream, LlmError>;

    /// Source name for logs
    fn name(&self) -> &str;
}
