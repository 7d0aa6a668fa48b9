//! Error types for the talking avatar

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the talking avatar
#[derive(Error, Debug)]
pub enum Error {
    // Speech synthesis errors
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    // Viseme extraction errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    // Playback errors
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    // LLM errors
    #[error("LLM error: {0}")]
    Llm(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Speech synthesis failures. Local to one sentence.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Synthesizer unavailable: {0}")]
    Unavailable(String),

    #[error("Synthesizer exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Synthesizer produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("Synthesized audio is unreadable: {0}")]
    InvalidAudio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

/// Viseme extraction failures. Local to one sentence.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extractor unavailable: {0}")]
    Unavailable(String),

    #[error("Extractor exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Cue file {} is unreadable: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed cue data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

/// Playback failures
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Audio asset missing: {}", .0.display())]
    MissingAsset(PathBuf),

    #[error("Audio asset corrupt: {0}")]
    CorruptAsset(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Player is busy")]
    Busy,

    #[error("Nothing loaded")]
    NotLoaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: Error = SynthesisError::Timeout(250).into();
        assert_eq!(err.to_string(), "Synthesis error: Timeout after 250ms");

        let err: Error = ExtractionError::ExitStatus {
            code: Some(1),
            stderr: "bad wav".to_string(),
        }
        .into();
        assert!(err.to_string().contains("bad wav"));
    }

    #[test]
    fn test_unreadable_mentions_path() {
        let err = ExtractionError::Unreadable {
            path: PathBuf::from("tts_files/a_lipsync.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("a_lipsync.json"));
    }
}
