//! Configuration for the talking avatar
//!
//! Settings are layered: `config/default.yaml`, then `config/{env}.yaml`,
//! then `AVATAR__*` environment variables.

pub mod pipeline;
pub mod settings;

pub use pipeline::{
    ExtractionConfig, FailurePolicy, OutputKind, PlaybackConfig, SegmenterConfig,
    SynthesisConfig,
};
pub use settings::{load_settings, ChatBackend, ChatConfig, ObservabilityConfig, Settings};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
