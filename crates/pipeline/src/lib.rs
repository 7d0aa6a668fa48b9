//! Speech and lip-sync pipeline for the talking avatar
//!
//! This crate turns a streamed reply into ordered, lip-synced speech:
//! - Sentence segmentation of the token stream
//! - Per-sentence synthesis + viseme extraction jobs (bounded, cancellable)
//! - Ordered playback scheduling by sequence number
//! - Lip-sync player driven by a fixed tick
//! - Session control loop tying it together (clear/interrupt included)

pub mod dispatcher;
pub mod lipsync;
pub mod output;
pub mod player;
pub mod scheduler;
pub mod segmenter;
pub mod session;
pub mod tts;

// Segmentation exports
pub use segmenter::SentenceSegmenter;

// Job exports
pub use dispatcher::{AssetNamer, JobDispatcher, JobFailure, JobOutcome};

// Adapter exports
pub use lipsync::RhubarbExtractor;
pub use output::ClockOutput;
#[cfg(feature = "audio-device")]
pub use output::DeviceOutput;
pub use tts::CommandSynthesizer;

// Playback exports
pub use player::{LipSyncPlayer, PlayerUpdate};
pub use scheduler::{PlaybackScheduler, SchedulerState, Submission};

// Session exports
pub use session::{AvatarEvent, AvatarSession, PlaybackStatus, SessionConfig};

use avatar_core::{ExtractionError, PlaybackError, SynthesisError};
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Not running")]
    NotRunning,
}

impl From<PipelineError> for avatar_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Synthesis(e) => avatar_core::Error::Synthesis(e),
            PipelineError::Extraction(e) => avatar_core::Error::Extraction(e),
            PipelineError::Playback(e) => avatar_core::Error::Playback(e),
            PipelineError::Io(e) => avatar_core::Error::Io(e),
            other => avatar_core::Error::Other(other.to_string()),
        }
    }
}
