//! Rhubarb Lip Sync adapter
//!
//! Runs `rhubarb [extra args] -f json -o <stem>_lipsync.json <audio>` and
//! reads the `mouthCues` array from the result.

use std::process::Stdio;

use async_trait::async_trait;
use avatar_config::ExtractionConfig;
use avatar_core::{AudioAsset, ExtractionError, MouthCue, VisemeExtractor, VisemeTimeline};
use serde::Deserialize;
use tokio::process::Command;

/// Rhubarb's JSON export
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CueDocument {
    mouth_cues: Vec<MouthCue>,
}

/// Parse a Rhubarb JSON document into a timeline
pub fn parse_cues(json: &str) -> Result<VisemeTimeline, ExtractionError> {
    let document: CueDocument = serde_json::from_str(json)?;
    Ok(VisemeTimeline::new(document.mouth_cues))
}

/// Viseme extraction through the Rhubarb command-line tool
#[derive(Debug, Clone)]
pub struct RhubarbExtractor {
    program: String,
    extra_args: Vec<String>,
}

impl RhubarbExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.program.clone()).with_args(config.extra_args.clone())
    }

    /// Extra options, e.g. `["-r", "phonetic"]`
    pub fn with_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }
}

#[async_trait]
impl VisemeExtractor for RhubarbExtractor {
    async fn extract(&self, audio: &AudioAsset) -> Result<VisemeTimeline, ExtractionError> {
        let cue_path = audio.lipsync_path();

        let result = Command::new(&self.program)
            .args(&self.extra_args)
            .args(["-f", "json"])
            .arg("-o")
            .arg(&cue_path)
            .arg(audio.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExtractionError::Unavailable(format!("{}: {}", self.program, e)))?;

        if !result.status.success() {
            return Err(ExtractionError::ExitStatus {
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let json = tokio::fs::read_to_string(&cue_path)
            .await
            .map_err(|source| ExtractionError::Unreadable {
                path: cue_path.clone(),
                source,
            })?;

        let timeline = parse_cues(&json)?;
        tracing::trace!(path = %cue_path.display(), cues = timeline.len(), "Extracted visemes");
        Ok(timeline)
    }

    fn name(&self) -> &str {
        "rhubarb"
    }
}
