//! Scripted chat source
//!
//! Replays a fixed reply as a token stream. Used for offline runs and tests.

use std::time::Duration;

use async_trait::async_trait;
use avatar_core::ChatMessage;

use crate::streaming::{token_channel, TokenStream};
use crate::{ChatSource, LlmError};

/// Replays fixed fragments, optionally pacing them
#[derive(Debug, Clone)]
pub struct ScriptedChatSource {
    fragments: Vec<String>,
    delay: Duration,
}

impl ScriptedChatSource {
    pub fn new(fragments: Vec<String>) -> Self {
        Self {
            fragments,
            delay: Duration::ZERO,
        }
    }

    /// Split `text` into word-sized fragments the way a model streams them:
    /// leading whitespace stays attached to the following word, punctuation
    /// is a fragment of its own.
    pub fn from_text(text: &str) -> Self {
        Self::new(fragment(text))
    }

    /// Pause between fragments
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}

fn fragment(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_whitespace() {
            if !current.trim().is_empty() {
                fragments.push(std::mem::take(&mut current));
            }
            current.push(c);
        } else if c.is_alphanumeric() {
            current.push(c);
        } else {
            if !current.is_empty() {
                fragments.push(std::mem::take(&mut current));
            }
            fragments.push(c.to_string());
        }
    }
    if !current.is_empty() {
        fragments.push(current);
    }

    fragments
}

#[async_trait]
impl ChatSource for ScriptedChatSource {
    async fn stream_reply(&self, _history: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let (tx, stream) = token_channel(self.fragments.len().max(1));
        let fragments = self.fragments.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            for fragment in fragments {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(fragment)).await.is_err() {
                    break;
                }
            }
        });

        Ok(stream)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_fragments_concatenate_back() {
        let text = "Hello, world. How are you?  Fine!";
        let source = ScriptedChatSource::from_text(text);
        assert_eq!(source.fragments().concat(), text);
        assert_eq!(&source.fragments()[..3], &["Hello", ",", " world"]);
    }

    #[test]
    fn test_fragments_cjk() {
        let text = "你好。很好！";
        let source = ScriptedChatSource::from_text(text);
        assert_eq!(source.fragments().concat(), text);
        assert!(source.fragments().contains(&"。".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_with_delay() {
        let source = ScriptedChatSource::new(vec!["a".into(), "b".into()])
            .with_delay(Duration::from_millis(50));
        let stream = source.stream_reply(&[]).await.unwrap();
        let tokens: Vec<String> = stream.map(|t| t.unwrap()).collect().await;
        assert_eq!(tokens, vec!["a", "b"]);
    }
}
