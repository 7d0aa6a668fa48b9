//! Collaborator traits
//!
//! The speech engine, the viseme tool and the audio device sit behind
//! these traits so the pipeline can be driven by fakes in tests and by
//! configured backends in the application.
//!
//! ```text
//! Speech:
//!   - SpeechSynthesizer: Sentence text -> WAV asset on disk
//!   - VisemeExtractor: WAV asset -> mouth-shape timeline
//!
//! Output:
//!   - AudioOutput: starts playing an asset
//!   - AudioPlayback: handle to one running playback
//! ```

mod output;
mod speech;

pub use output::{AudioOutput, AudioPlayback};
pub use speech::{SpeechSynthesizer, VisemeExtractor};
