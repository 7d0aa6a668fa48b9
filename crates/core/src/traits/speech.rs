//! Speech synthesis and viseme extraction boundaries

use std::path::Path;

use async_trait::async_trait;

use crate::{AudioAsset, ExtractionError, SynthesisError, VisemeTimeline};

/// Text-to-speech engine
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into a playable audio file at `output`.
    ///
    /// The caller picks a unique `output` per call.
    async fn synthesize(&self, text: &str, output: &Path) -> Result<AudioAsset, SynthesisError>;

    /// Engine name for logs
    fn name(&self) -> &str;
}

/// Mouth-shape cue generator
#[async_trait]
pub trait VisemeExtractor: Send + Sync {
    /// Derive a viseme timeline from a synthesized audio asset
    async fn extract(&self, audio: &AudioAsset) -> Result<VisemeTimeline, ExtractionError>;

    /// Extractor name for logs
    fn name(&self) -> &str;
}
