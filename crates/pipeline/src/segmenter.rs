//! Sentence segmentation for streamed replies
//!
//! Cuts the token stream into sentences at terminator characters so each
//! sentence can be synthesized as soon as it is complete.

use avatar_config::SegmenterConfig;
use avatar_core::{Sentence, SequenceNumber};

/// Streaming sentence segmenter
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    /// Characters that end a sentence
    terminators: Vec<char>,
    /// Emit unterminated text at end of stream?
    flush_trailing: bool,
    /// Text after the last cut
    buffer: String,
    /// Sequence number of the next emitted sentence
    next_seq: SequenceNumber,
}

impl SentenceSegmenter {
    /// Create a segmenter from configuration
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            terminators: config.terminator_set(),
            flush_trailing: config.flush_trailing,
            buffer: String::new(),
            next_seq: SequenceNumber::FIRST,
        }
    }

    /// Create a segmenter with an explicit terminator set
    pub fn with_terminators(terminators: impl IntoIterator<Item = char>) -> Self {
        Self {
            terminators: terminators.into_iter().collect(),
            flush_trailing: true,
            buffer: String::new(),
            next_seq: SequenceNumber::FIRST,
        }
    }

    /// Set the end-of-stream policy
    pub fn flush_trailing(mut self, flush: bool) -> Self {
        self.flush_trailing = flush;
        self
    }

    /// Add a token, returning the sentences it completed (zero or more)
    pub fn feed(&mut self, token: &str) -> Vec<Sentence> {
        self.buffer.push_str(token);

        let cuts: Vec<usize> = self
            .buffer
            .char_indices()
            .filter(|(_, c)| self.terminators.contains(c))
            .map(|(i, c)| i + c.len_utf8())
            .collect();

        let Some(&last_cut) = cuts.last() else {
            return Vec::new();
        };

        let mut sentences = Vec::with_capacity(cuts.len());
        let mut start = 0;
        for end in cuts {
            if let Some(sentence) = Sentence::new(self.next_seq, &self.buffer[start..end]) {
                self.next_seq = self.next_seq.next();
                sentences.push(sentence);
            }
            start = end;
        }

        self.buffer.drain(..last_cut);
        sentences
    }

    /// End of stream: flush or drop whatever is left in the buffer
    pub fn finish(&mut self) -> Option<Sentence> {
        let rest = std::mem::take(&mut self.buffer);

        if !self.flush_trailing {
            if !rest.trim().is_empty() {
                tracing::debug!(text = %rest.trim(), "Dropping unterminated trailing text");
            }
            return None;
        }

        let sentence = Sentence::new(self.next_seq, &rest)?;
        self.next_seq = self.next_seq.next();
        Some(sentence)
    }

    /// Drop buffered text. Sequence numbering continues.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Sequence number the next sentence will get
    pub fn next_seq(&self) -> SequenceNumber {
        self.next_seq
    }

    /// Text waiting for a terminator
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(&SegmenterConfig::default())
    }
}
