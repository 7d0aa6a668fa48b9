//! Speech synthesis through an external command
//!
//! The argument template may reference `{text}` and `{output}`. Arguments are
//! passed directly to the program; no shell is involved.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use avatar_config::SynthesisConfig;
use avatar_core::{AudioAsset, SpeechSynthesizer, SynthesisError};
use tokio::process::Command;

const TEXT_PLACEHOLDER: &str = "{text}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Runs a TTS program that writes a WAV file
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// espeak-ng writing straight to the output file
    pub fn espeak() -> Self {
        Self::from_config(&SynthesisConfig::default())
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    fn render_args(&self, text: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            // {output} first so text containing "{output}" stays literal
            .map(|arg| {
                arg.replace(OUTPUT_PLACEHOLDER, &output)
                    .replace(TEXT_PLACEHOLDER, text)
            })
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<AudioAsset, SynthesisError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = Command::new(&self.program)
            .args(self.render_args(text, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SynthesisError::Unavailable(format!("{}: {}", self.program, e)))?;

        if !result.status.success() {
            return Err(SynthesisError::ExitStatus {
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.exists() {
            return Err(SynthesisError::MissingOutput(output.to_path_buf()));
        }

        let asset = AudioAsset::from_wav(output)
            .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))?;

        tracing::trace!(
            program = %self.program,
            path = %output.display(),
            duration_ms = asset.duration().as_millis() as u64,
            "Synthesized sentence"
        );
        Ok(asset)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_args() {
        let synth = CommandSynthesizer::espeak();
        let rendered = synth.render_args("Say {output} please", Path::new("out/a.wav"));
        assert_eq!(rendered, vec!["-w", "out/a.wav", "Say {output} please"]);
    }

    #[tokio::test]
    async fn test_copies_generated_wav() {
        let dir = tempfile::tempdir().unwrap();
        let source =
            AudioAsset::write_silence(dir.path().join("source.wav"), Duration::from_millis(250), 16000)
                .unwrap();

        let synth = CommandSynthesizer::new(
            "cp",
            vec![source.path().to_string_lossy().into_owned(), "{output}".to_string()],
        );
        let output = dir.path().join("nested").join("temp_1_1.wav");
        let asset = synth.synthesize("Hello.", &output).await.unwrap();

        assert_eq!(asset.path(), output);
        assert_eq!(asset.duration(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_text_reaches_program_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("speech.wav");
        // Writes the text instead of audio, so the WAV probe fails afterwards
        let synth = CommandSynthesizer::new(
            "sh",
            args(&["-c", "printf '%s' \"$1\" > \"$0\"", "{output}", "{text}"]),
        );

        let result = synth.synthesize("It's $HOME; fine.", &output).await;
        assert!(matches!(result, Err(SynthesisError::InvalidAudio(_))));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "It's $HOME; fine.");
    }

    #[tokio::test]
    async fn test_failure_modes() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("speech.wav");

        let missing = CommandSynthesizer::new("definitely-not-a-tts-binary", vec![]);
        assert!(matches!(
            missing.synthesize("Hi.", &output).await,
            Err(SynthesisError::Unavailable(_))
        ));

        let failing = CommandSynthesizer::new("sh", args(&["-c", "echo broken >&2; exit 3"]));
        match failing.synthesize("Hi.", &output).await {
            Err(SynthesisError::ExitStatus { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("expected exit status error, got {other:?}"),
        }

        let silent = CommandSynthesizer::new("true", vec![]);
        assert!(matches!(
            silent.synthesize("Hi.", &output).await,
            Err(SynthesisError::MissingOutput(_))
        ));
    }
}
