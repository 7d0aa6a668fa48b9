//! Conversational glue for the talking avatar
//!
//! Features:
//! - Sends user messages with the running history to a chat source
//! - Streams reply fragments straight into the avatar session
//! - Records full replies in the history
//! - Clear/interrupt across chat, history and speech

pub mod conversation;

pub use conversation::{Conversation, ConversationEvent, ConversationState};

use std::sync::Arc;
use std::time::Duration;

use avatar_config::{ChatBackend, ChatConfig};
use avatar_llm::{ChatSource, LlmError, OpenAiChatSource, ScriptedChatSource};
use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] avatar_pipeline::PipelineError),

    #[error("A reply is already streaming")]
    Busy,

    #[error("Reply interrupted")]
    Interrupted,
}

impl From<AgentError> for avatar_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Llm(e) => e.into(),
            AgentError::Pipeline(e) => e.into(),
            other => avatar_core::Error::Other(other.to_string()),
        }
    }
}

/// Build the chat source selected by configuration
pub fn build_chat_source(config: &ChatConfig) -> Result<Arc<dyn ChatSource>, AgentError> {
    match config.backend {
        ChatBackend::OpenAi => {
            let source = OpenAiChatSource::new(
                &config.base_url,
                config.model.clone(),
                config.resolve_api_key(),
                Duration::from_secs(config.timeout_seconds),
            )?
            .with_temperature(config.temperature);
            Ok(Arc::new(source))
        }
        ChatBackend::Scripted => Ok(Arc::new(
            ScriptedChatSource::from_text(&config.scripted_reply)
                .with_delay(Duration::from_millis(30)),
        )),
    }
}
