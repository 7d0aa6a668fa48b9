//! Audio output boundary

use crate::{AudioAsset, PlaybackError};

/// Something that can play an audio asset
pub trait AudioOutput: Send + Sync {
    /// Start playing `asset`. Returns a handle to the running playback.
    fn play(&self, asset: &AudioAsset) -> Result<Box<dyn AudioPlayback>, PlaybackError>;

    /// Output name for logs
    fn name(&self) -> &str;
}

/// Handle to one running playback
pub trait AudioPlayback: Send {
    /// Has the audio reached its natural end?
    fn is_finished(&self) -> bool;

    /// Halt the audio early
    fn stop(&mut self);
}
