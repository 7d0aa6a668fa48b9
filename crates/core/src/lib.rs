//! Core types for the talking avatar
//!
//! This crate holds everything the other crates agree on:
//! - Sentences and their sequence numbers
//! - Audio assets produced by speech synthesis
//! - Mouth-shape cues and viseme timelines
//! - Playback entries (the joined unit the scheduler orders)
//! - Chat history messages
//! - Collaborator traits for synthesis, viseme extraction and audio output

pub mod audio;
pub mod chat;
pub mod error;
pub mod playback;
pub mod sentence;
pub mod traits;
pub mod viseme;

pub use audio::AudioAsset;
pub use chat::{ChatMessage, ChatRole};
pub use error::{Error, ExtractionError, PlaybackError, Result, SynthesisError};
pub use playback::PlaybackEntry;
pub use sentence::{DisplayTarget, ReplyId, Sentence, SequenceNumber};
pub use traits::{AudioOutput, AudioPlayback, SpeechSynthesizer, VisemeExtractor};
pub use viseme::{MouthCue, MouthShape, VisemeTimeline};
