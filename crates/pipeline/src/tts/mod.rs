//! Speech synthesis adapters
//!
//! Synthesis goes through the `SpeechSynthesizer` trait from `avatar-core`;
//! the default adapter shells out to a TTS program (espeak-ng).

mod command;

pub use command::CommandSynthesizer;
