//! Sentences and their ordering keys

use std::fmt;

use serde::{Deserialize, Serialize};

/// Creation-order index of a sentence.
///
/// The only ordering key for playback, regardless of the order in which
/// synthesis and extraction finish. Starts at 1 and never restarts within
/// a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// First sequence number handed out
    pub const FIRST: Self = Self(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The sequence number after this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Default for SequenceNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one assistant reply (one chat bubble)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplyId(u64);

impl ReplyId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ReplyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a sentence should be displayed once it starts playing.
///
/// Every playback entry carries its own target so that sentences of
/// different replies never write into each other's bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayTarget {
    pub reply_id: ReplyId,
}

impl DisplayTarget {
    pub fn new(reply_id: ReplyId) -> Self {
        Self { reply_id }
    }
}

/// A complete sentence cut from the token stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    seq: SequenceNumber,
    text: String,
}

impl Sentence {
    /// Build a sentence from raw text.
    ///
    /// Surrounding whitespace is trimmed. Returns `None` if nothing is left.
    pub fn new(seq: SequenceNumber, text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            seq,
            text: text.to_string(),
        })
    }

    pub fn seq(&self) -> SequenceNumber {
        self.seq
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?}", self.seq, self.text)
    }
}
