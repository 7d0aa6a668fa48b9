//! Synthesized speech assets on disk

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Suffix of the cue file written next to an audio asset
pub const LIPSYNC_SUFFIX: &str = "_lipsync.json";

/// A playable audio file plus its nominal duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAsset {
    path: PathBuf,
    duration: Duration,
}

impl AudioAsset {
    pub fn new(path: impl Into<PathBuf>, duration: Duration) -> Self {
        Self {
            path: path.into(),
            duration,
        }
    }

    /// Probe a WAV file and take its duration from the header
    pub fn from_wav(path: impl Into<PathBuf>) -> Result<Self, hound::Error> {
        let path = path.into();
        let reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();
        // duration() counts samples per channel
        let frames = reader.duration() as f64;
        let duration = if spec.sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(frames / spec.sample_rate as f64)
        };
        Ok(Self { path, duration })
    }

    /// Write a silent mono 16-bit WAV of `duration` and return it as an asset
    pub fn write_silence(
        path: impl Into<PathBuf>,
        duration: Duration,
        sample_rate: u32,
    ) -> Result<Self, hound::Error> {
        let path = path.into();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let frames = (duration.as_secs_f64() * sample_rate as f64).round() as u64;
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for _ in 0..frames {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
        Self::from_wav(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Where the viseme cue file for this asset lives: `<stem>_lipsync.json`
    pub fn lipsync_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!("{stem}{LIPSYNC_SUFFIX}"))
    }

    /// Delete the audio file and its cue file, ignoring files already gone.
    pub fn remove_files(&self) -> std::io::Result<()> {
        for path in [self.path.clone(), self.lipsync_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lipsync_path() {
        let asset = AudioAsset::new("tts_files/temp_1700000000000_3.wav", Duration::ZERO);
        assert_eq!(
            asset.lipsync_path(),
            PathBuf::from("tts_files/temp_1700000000000_3_lipsync.json")
        );
    }

    #[test]
    fn test_silence_roundtrip_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");

        let asset = AudioAsset::write_silence(&path, Duration::from_millis(500), 16000).unwrap();
        assert!(path.exists());
        assert_eq!(asset.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_remove_files_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        let asset = AudioAsset::write_silence(&path, Duration::from_millis(10), 8000).unwrap();
        std::fs::write(asset.lipsync_path(), "{}").unwrap();

        asset.remove_files().unwrap();
        assert!(!path.exists());
        assert!(!asset.lipsync_path().exists());

        // Second call: both files already gone
        asset.remove_files().unwrap();
    }

    #[test]
    fn test_from_wav_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"not a wav").unwrap();
        assert!(AudioAsset::from_wav(&path).is_err());
    }
}
