//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    ConfigError, ExtractionConfig, FailurePolicy, PlaybackConfig, SegmenterConfig,
    SynthesisConfig,
};

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Chat model configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Sentence segmentation
    #[serde(default)]
    pub segmenter: SegmenterConfig,

    /// Speech synthesis
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Viseme extraction
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Playback and lip-sync clock
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tick = self.playback.tick_interval_ms;
        if !(5..=50).contains(&tick) {
            return Err(invalid(
                "playback.tick_interval_ms",
                format!("{tick}ms is outside 5..=50ms"),
            ));
        }

        if self.segmenter.terminator_set().is_empty() {
            return Err(invalid(
                "segmenter.terminators",
                "at least one terminator is required",
            ));
        }

        if self.synthesis.timeout_ms == 0 {
            return Err(invalid("synthesis.timeout_ms", "must be non-zero"));
        }
        if self.extraction.timeout_ms == 0 {
            return Err(invalid("extraction.timeout_ms", "must be non-zero"));
        }
        if self.synthesis.max_concurrent_jobs == 0 {
            return Err(invalid("synthesis.max_concurrent_jobs", "must be non-zero"));
        }
        if !self.synthesis.args.iter().any(|arg| arg.contains("{output}")) {
            return Err(invalid(
                "synthesis.args",
                "must contain an {output} placeholder",
            ));
        }

        if self.playback.failure_policy == FailurePolicy::Placeholder
            && (self.playback.placeholder_ms == 0 || self.playback.placeholder_sample_rate == 0)
        {
            return Err(invalid(
                "playback.placeholder_ms",
                "placeholder policy needs a non-zero length and sample rate",
            ));
        }

        self.warn_missing_programs();

        Ok(())
    }

    /// External tools may be installed later, so a missing program only warns
    fn warn_missing_programs(&self) {
        let programs = [
            ("synthesis.program", &self.synthesis.program),
            ("extraction.program", &self.extraction.program),
        ];

        for (field, program) in programs {
            if !program_exists(program) {
                tracing::warn!("Program not found: {} = {}", field, program);
            }
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Is `program` an existing path, or present in a `PATH` directory?
fn program_exists(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }

    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || candidate.with_extension("exe").is_file()
    })
}

/// Which chat source to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatBackend {
    /// OpenAI-compatible streaming chat completions endpoint
    #[default]
    OpenAi,
    /// Replays `scripted_reply`, for offline runs
    Scripted,
}

/// Chat model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub backend: ChatBackend,

    /// API base URL, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key. Falls back to `OPENAI_API_KEY` when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Optional system prompt placed first in the history
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Reply used by the scripted backend
    #[serde(default = "default_scripted_reply")]
    pub scripted_reply: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_scripted_reply() -> String {
    "Hello! I am running offline today. Ask me anything, and I will answer in a few sentences."
        .to_string()
}
fn default_request_timeout() -> u64 {
    60
}

impl ChatConfig {
    /// Configured key, else the `OPENAI_API_KEY` environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend: ChatBackend::OpenAi,
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            system_prompt: None,
            temperature: None,
            scripted_reply: default_scripted_reply(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment. Call [`Settings::validate`]
/// on the result.
///
/// Priority (highest to lowest):
/// 1. Environment variables (AVATAR_ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::with_name("config/default").required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("AVATAR")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.playback.tick_interval_ms, 10);
        assert_eq!(settings.chat.model, "gpt-4");
        assert!(settings.segmenter.flush_trailing);
    }

    #[test]
    fn test_load_leaves_validation_to_caller() {
        std::env::set_var("AVATAR__PLAYBACK__TICK_INTERVAL_MS", "100");
        let loaded = load_settings(None);
        std::env::remove_var("AVATAR__PLAYBACK__TICK_INTERVAL_MS");

        let settings = loaded.unwrap();
        assert_eq!(settings.playback.tick_interval_ms, 100);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.playback.tick_interval_ms = 100; // Too slow for lip sync
        assert!(settings.validate().is_err());

        settings.playback.tick_interval_ms = 20;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_output_placeholder_required() {
        let mut settings = Settings::default();
        settings.synthesis.args = vec!["{text}".to_string()];
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "synthesis.args"
        ));
    }

    #[test]
    fn test_empty_terminators_rejected() {
        let mut settings = Settings::default();
        settings.segmenter.terminators.clear();
        assert!(settings.validate().is_err());

        // Commas alone are enough
        settings.segmenter.split_on_comma = true;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_placeholder_policy_needs_length() {
        let mut settings = Settings::default();
        settings.playback.failure_policy = FailurePolicy::Placeholder;
        settings.playback.placeholder_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_configured_api_key_wins() {
        let config = ChatConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-test"));
    }
}
