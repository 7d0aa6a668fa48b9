//! Pipeline configuration: segmentation, synthesis, extraction, playback

use serde::{Deserialize, Serialize};

/// Sentence segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Characters that end a sentence
    #[serde(default = "default_terminators")]
    pub terminators: Vec<char>,

    /// Also cut at `,` and `，`. Produces short, choppy speech segments.
    #[serde(default)]
    pub split_on_comma: bool,

    /// Emit unterminated trailing text as a last sentence at stream end
    #[serde(default = "default_true")]
    pub flush_trailing: bool,
}

fn default_terminators() -> Vec<char> {
    vec!['.', '!', '?', '。', '！', '？']
}
fn default_true() -> bool {
    true
}

impl SegmenterConfig {
    /// Effective terminator set, commas included when enabled
    pub fn terminator_set(&self) -> Vec<char> {
        let mut set = self.terminators.clone();
        if self.split_on_comma {
            for comma in [',', '，'] {
                if !set.contains(&comma) {
                    set.push(comma);
                }
            }
        }
        set
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            terminators: default_terminators(),
            split_on_comma: false,
            flush_trailing: true,
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// TTS program to run
    #[serde(default = "default_tts_program")]
    pub program: String,

    /// Arguments; `{text}` and `{output}` are substituted per call
    #[serde(default = "default_tts_args")]
    pub args: Vec<String>,

    /// Directory for generated audio and cue files
    #[serde(default = "default_asset_dir")]
    pub asset_dir: String,

    /// File name prefix for generated audio
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Per-sentence synthesis timeout
    #[serde(default = "default_synthesis_timeout")]
    pub timeout_ms: u64,

    /// Sentences synthesized/extracted at the same time
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_tts_program() -> String {
    "espeak-ng".to_string()
}
fn default_tts_args() -> Vec<String> {
    vec!["-w".to_string(), "{output}".to_string(), "{text}".to_string()]
}
fn default_asset_dir() -> String {
    "tts_files".to_string()
}
fn default_file_prefix() -> String {
    "temp".to_string()
}
fn default_synthesis_timeout() -> u64 {
    15_000
}
fn default_max_concurrent_jobs() -> usize {
    4
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            program: default_tts_program(),
            args: default_tts_args(),
            asset_dir: default_asset_dir(),
            file_prefix: default_file_prefix(),
            timeout_ms: default_synthesis_timeout(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

/// Viseme extraction configuration (Rhubarb Lip Sync)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Path to the rhubarb executable
    #[serde(default = "default_rhubarb_program")]
    pub program: String,

    /// Extra arguments, e.g. `["--recognizer", "phonetic"]`
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Per-sentence extraction timeout
    #[serde(default = "default_extraction_timeout")]
    pub timeout_ms: u64,
}

fn default_rhubarb_program() -> String {
    "rhubarb".to_string()
}
fn default_extraction_timeout() -> u64 {
    30_000
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            program: default_rhubarb_program(),
            extra_args: Vec::new(),
            timeout_ms: default_extraction_timeout(),
        }
    }
}

/// What to do when a sentence's synthesis or extraction fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Drop the sentence; the next one becomes the head of the queue
    #[default]
    Skip,
    /// Play silence with a closed mouth in its place
    Placeholder,
}

/// Audio output selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// No sound; playback completes after the asset duration
    #[default]
    Clock,
    /// Default audio device (requires the `audio-device` feature)
    Device,
}

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Lip-sync clock cadence
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Length of the silent stand-in for a failed sentence
    #[serde(default = "default_placeholder_ms")]
    pub placeholder_ms: u64,

    /// Sample rate of the silent stand-in
    #[serde(default = "default_placeholder_sample_rate")]
    pub placeholder_sample_rate: u32,

    /// Delete audio and cue files once a sentence has played
    #[serde(default = "default_true")]
    pub cleanup_assets: bool,

    #[serde(default)]
    pub output: OutputKind,

    /// Capacity of the presentation event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_tick_interval() -> u64 {
    10
}
fn default_placeholder_ms() -> u64 {
    400
}
fn default_placeholder_sample_rate() -> u32 {
    16_000
}
fn default_event_capacity() -> usize {
    1024
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            failure_policy: FailurePolicy::Skip,
            placeholder_ms: default_placeholder_ms(),
            placeholder_sample_rate: default_placeholder_sample_rate(),
            cleanup_assets: true,
            output: OutputKind::Clock,
            event_capacity: default_event_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_policy() {
        let mut config = SegmenterConfig::default();
        assert!(!config.terminator_set().contains(&','));

        config.split_on_comma = true;
        let set = config.terminator_set();
        assert!(set.contains(&','));
        assert!(set.contains(&'，'));
    }

    #[test]
    fn test_failure_policy_serde() {
        let policy: FailurePolicy = serde_json::from_str(r#""placeholder""#).unwrap();
        assert_eq!(policy, FailurePolicy::Placeholder);
    }

    #[test]
    fn test_playback_defaults_from_empty() {
        let config: PlaybackConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.tick_interval_ms, 10);
        assert_eq!(config.failure_policy, FailurePolicy::Skip);
        assert!(config.cleanup_assets);
    }
}
