//! Streaming Token Plumbing
//!
//! Bridges producers (blocking HTTP readers, scripted replays) to async
//! consumers through a bounded channel.

use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream};

use crate::LlmError;

/// Token stream type
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Producer side of a token stream
pub type TokenSender = mpsc::Sender<Result<String, LlmError>>;

/// Create a channel pair for streaming
pub fn token_channel(buffer: usize) -> (TokenSender, TokenStream) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, Box::pin(ReceiverStream::new(rx)))
}

/// Accumulates streamed fragments into the full reply
#[derive(Debug, Default)]
pub struct ReplyBuilder {
    tokens: Vec<String>,
}

impl ReplyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token
    pub fn add_token(&mut self, token: &str) {
        self.tokens.push(token.to_string());
    }

    /// Get all tokens collected so far
    pub fn collected(&self) -> &[String] {
        &self.tokens
    }

    /// Get current text
    pub fn current_text(&self) -> String {
        self.tokens.concat()
    }

    /// Finalize and get complete text
    pub fn finalize(self) -> String {
        self.tokens.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_reply_builder() {
        let mut builder = ReplyBuilder::new();
        builder.add_token("Hel");
        builder.add_token("lo.");
        assert_eq!(builder.collected().len(), 2);
        assert_eq!(builder.current_text(), "Hello.");
        assert_eq!(builder.finalize(), "Hello.");
    }

    #[tokio::test]
    async fn test_token_channel() {
        let (tx, mut stream) = token_channel(10);

        tx.send(Ok("Hello".to_string())).await.unwrap();
        tx.send(Ok(" world".to_string())).await.unwrap();
        drop(tx);

        let mut tokens = Vec::new();
        while let Some(token) = stream.next().await {
            tokens.push(token.unwrap());
        }

        assert_eq!(tokens, vec!["Hello", " world"]);
    }
}
