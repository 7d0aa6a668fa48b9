//! Conversation Management
//!
//! One turn: record the user message, stream the reply into the avatar
//! session fragment by fragment, record the full reply once the stream ends.

use std::sync::Arc;

use avatar_core::{ChatMessage, ReplyId};
use avatar_llm::{ChatSource, ConversationHistory, ReplyBuilder};
use avatar_pipeline::AvatarSession;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::AgentError;

/// Conversation event
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// User message recorded
    UserMessage { content: String },
    /// Reply stream opened; speech for it targets `reply_id`
    ReplyStarted { reply_id: ReplyId },
    /// Fragment received
    ReplyToken { reply_id: ReplyId, token: String },
    /// Stream ended; `text` is the full reply
    ReplyCompleted { reply_id: ReplyId, text: String },
    /// History and speech dropped
    Cleared,
    /// Error occurred
    Error(String),
}

/// Conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    Replying,
}

/// Conversation manager
pub struct Conversation {
    /// Conversation ID
    id: String,
    started_at: DateTime<Utc>,
    chat: Arc<dyn ChatSource>,
    avatar: Arc<AvatarSession>,
    history: Mutex<ConversationHistory>,
    state: Mutex<ConversationState>,
    /// Bumped on interrupt; a reply from an older generation stops feeding
    /// the avatar
    generation: watch::Sender<u64>,
    /// Event sender
    event_tx: broadcast::Sender<ConversationEvent>,
    turn_count: Mutex<usize>,
}

impl Conversation {
    /// Create a new conversation
    pub fn new(
        chat: Arc<dyn ChatSource>,
        avatar: Arc<AvatarSession>,
        system_prompt: Option<String>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (generation, _) = watch::channel(0);
        let history = match system_prompt {
            Some(prompt) => ConversationHistory::with_system_prompt(prompt),
            None => ConversationHistory::new(),
        };

        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(conversation = %id, chat = chat.name(), "Conversation started");

        Self {
            id,
            started_at: Utc::now(),
            chat,
            avatar,
            history: Mutex::new(history),
            state: Mutex::new(ConversationState::Idle),
            generation,
            event_tx,
            turn_count: Mutex::new(0),
        }
    }

    /// Subscribe to conversation events
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.event_tx.subscribe()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> ConversationState {
        *self.state.lock()
    }

    /// Completed turns
    pub fn turn_count(&self) -> usize {
        *self.turn_count.lock()
    }

    /// History in request order
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().messages()
    }

    pub fn avatar(&self) -> &Arc<AvatarSession> {
        &self.avatar
    }

    /// Send a user message and speak the reply as it streams.
    ///
    /// Returns the full reply text. Only one reply streams at a time.
    pub async fn send(&self, content: &str) -> Result<String, AgentError> {
        {
            let mut state = self.state.lock();
            if *state == ConversationState::Replying {
                return Err(AgentError::Busy);
            }
            *state = ConversationState::Replying;
        }

        let result = self.run_turn(content).await;
        *self.state.lock() = ConversationState::Idle;

        match &result {
            Ok(_) => *self.turn_count.lock() += 1,
            Err(AgentError::Interrupted) => {
                tracing::debug!(conversation = %self.id, "Reply interrupted");
            }
            Err(e) => {
                tracing::warn!(conversation = %self.id, "Turn failed: {}", e);
                let _ = self.event_tx.send(ConversationEvent::Error(e.to_string()));
            }
        }
        result
    }

    async fn run_turn(&self, content: &str) -> Result<String, AgentError> {
        let mut interrupts = self.generation.subscribe();
        let generation = *interrupts.borrow_and_update();

        let messages = {
            let mut history = self.history.lock();
            history.push_user(content);
            history.messages()
        };
        let _ = self.event_tx.send(ConversationEvent::UserMessage {
            content: content.to_string(),
        });

        let mut stream = self.chat.stream_reply(&messages).await?;

        let target = self.avatar.begin_reply();
        let reply_id = target.reply_id;
        let _ = self.event_tx.send(ConversationEvent::ReplyStarted { reply_id });
        tracing::debug!(conversation = %self.id, reply = %reply_id, "Streaming reply");

        let mut reply = ReplyBuilder::new();
        loop {
            let token = tokio::select! {
                token = stream.next() => token,
                _ = interrupts.changed() => return Err(AgentError::Interrupted),
            };

            let token = match token {
                Some(Ok(token)) => token,
                Some(Err(e)) => {
                    // Speak what arrived; the segmenter must not carry it over
                    self.if_current(generation, || self.avatar.finish_reply(target));
                    return Err(e.into());
                }
                None => break,
            };

            self.if_current(generation, || self.avatar.push_text(target, &token))
                .ok_or(AgentError::Interrupted)?;
            reply.add_token(&token);
            let _ = self
                .event_tx
                .send(ConversationEvent::ReplyToken { reply_id, token });
        }

        self.if_current(generation, || self.avatar.finish_reply(target))
            .ok_or(AgentError::Interrupted)?;

        let text = reply.finalize();
        self.history.lock().push_assistant(text.clone());
        let _ = self.event_tx.send(ConversationEvent::ReplyCompleted {
            reply_id,
            text: text.clone(),
        });
        Ok(text)
    }

    /// Run `f` unless an interrupt happened since `generation`. The check and
    /// `f` are atomic with respect to `interrupt`.
    fn if_current<T>(&self, generation: u64, f: impl FnOnce() -> T) -> Option<T> {
        let current = self.generation.borrow();
        (*current == generation).then(f)
    }

    /// Stop the streaming reply and all pending speech; history is kept
    pub async fn interrupt(&self) -> Result<(), AgentError> {
        self.generation.send_modify(|generation| *generation += 1);
        self.avatar.clear().await?;
        Ok(())
    }

    /// Interrupt, then forget the history (the system prompt stays)
    pub async fn clear(&self) -> Result<(), AgentError> {
        self.interrupt().await?;
        self.history.lock().clear();
        *self.turn_count.lock() = 0;

        tracing::info!(conversation = %self.id, "Conversation cleared");
        let _ = self.event_tx.send(ConversationEvent::Cleared);
        Ok(())
    }
}
