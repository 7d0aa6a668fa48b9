//! Lip-sync player
//!
//! Plays one entry at a time and, on every tick, reports the mouth shape
//! for the elapsed playback time. Between cues the previous shape holds.

use std::sync::Arc;
use std::time::Duration;

use avatar_core::{
    AudioOutput, AudioPlayback, MouthShape, PlaybackEntry, PlaybackError, SequenceNumber,
};
use tokio::time::Instant;

/// What one tick produced
#[derive(Debug)]
pub enum PlayerUpdate {
    /// Mouth shape at `elapsed`
    Frame {
        seq: SequenceNumber,
        elapsed: Duration,
        shape: MouthShape,
    },
    /// Audio reached its end. Carries the finished entry back to the caller.
    Finished(PlaybackEntry),
}

/// Drives audio output and mouth shapes for the loaded entry
pub struct LipSyncPlayer {
    output: Arc<dyn AudioOutput>,
    loaded: Option<PlaybackEntry>,
    playback: Option<Box<dyn AudioPlayback>>,
    started_at: Option<Instant>,
    shape: MouthShape,
}

impl LipSyncPlayer {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            loaded: None,
            playback: None,
            started_at: None,
            shape: MouthShape::NEUTRAL,
        }
    }

    /// Load an entry. The mouth resets to neutral.
    pub fn load(&mut self, entry: PlaybackEntry) -> Result<(), PlaybackError> {
        if self.is_playing() {
            return Err(PlaybackError::Busy);
        }
        self.loaded = Some(entry);
        self.started_at = None;
        self.shape = MouthShape::NEUTRAL;
        Ok(())
    }

    /// Start the audio and the clock together
    pub fn start(&mut self, now: Instant) -> Result<(), PlaybackError> {
        if self.is_playing() {
            return Err(PlaybackError::Busy);
        }
        let entry = self.loaded.as_ref().ok_or(PlaybackError::NotLoaded)?;

        let playback = self.output.play(entry.audio())?;
        tracing::debug!(
            seq = %entry.seq(),
            output = self.output.name(),
            duration_ms = entry.audio().duration().as_millis() as u64,
            "Playback started"
        );

        self.playback = Some(playback);
        self.started_at = Some(now);
        Ok(())
    }

    /// Advance to `now`. `None` when nothing is playing.
    pub fn tick(&mut self, now: Instant) -> Option<PlayerUpdate> {
        let started_at = self.started_at?;
        let finished = self
            .playback
            .as_ref()
            .map_or(true, |playback| playback.is_finished());

        if finished {
            self.started_at = None;
            self.playback = None;
            self.shape = MouthShape::NEUTRAL;
            return self.loaded.take().map(PlayerUpdate::Finished);
        }

        let entry = self.loaded.as_ref()?;
        let elapsed = now.saturating_duration_since(started_at);
        if let Some(shape) = entry.timeline().shape_at(elapsed.as_secs_f64()) {
            self.shape = shape;
        }

        Some(PlayerUpdate::Frame {
            seq: entry.seq(),
            elapsed,
            shape: self.shape,
        })
    }

    /// Halt audio and clock. Returns the entry that was loaded, if any.
    pub fn stop(&mut self) -> Option<PlaybackEntry> {
        if let Some(mut playback) = self.playback.take() {
            playback.stop();
        }
        self.started_at = None;
        self.shape = MouthShape::NEUTRAL;
        self.loaded.take()
    }

    pub fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn current_shape(&self) -> MouthShape {
        self.shape
    }

    pub fn current_seq(&self) -> Option<SequenceNumber> {
        self.loaded.as_ref().map(PlaybackEntry::seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ClockOutput;
    use avatar_core::{AudioAsset, DisplayTarget, MouthCue, ReplyId, Sentence, VisemeTimeline};
    use tempfile::TempDir;

    fn entry(dir: &TempDir, seconds: f64, cues: Vec<MouthCue>) -> PlaybackEntry {
        let audio = AudioAsset::write_silence(
            dir.path().join("speech.wav"),
            Duration::from_secs_f64(seconds),
            8000,
        )
        .unwrap();
        PlaybackEntry::new(
            Sentence::new(SequenceNumber::FIRST, "Hello there.").unwrap(),
            DisplayTarget::new(ReplyId::new(1)),
            audio,
            VisemeTimeline::new(cues),
        )
    }

    fn shape(update: Option<PlayerUpdate>) -> MouthShape {
        match update {
            Some(PlayerUpdate::Frame { shape, .. }) => shape,
            other => panic!("expected frame, got {other:?}"),
        }
    }

    fn player() -> LipSyncPlayer {
        LipSyncPlayer::new(Arc::new(ClockOutput))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cue_lookup_holds_last_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = player();
        player
            .load(entry(
                &dir,
                2.0,
                vec![
                    MouthCue::new(0.0, 0.5, MouthShape::A),
                    MouthCue::new(0.5, 1.2, MouthShape::B),
                ],
            ))
            .unwrap();

        let t0 = Instant::now();
        player.start(t0).unwrap();

        assert_eq!(shape(player.tick(t0 + Duration::from_millis(300))), MouthShape::A);
        assert_eq!(shape(player.tick(t0 + Duration::from_millis(500))), MouthShape::B);
        // Past the last cue the previous shape holds
        assert_eq!(shape(player.tick(t0 + Duration::from_millis(1500))), MouthShape::B);
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_before_first_cue() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = player();
        player
            .load(entry(&dir, 1.0, vec![MouthCue::new(0.2, 0.6, MouthShape::C)]))
            .unwrap();

        let t0 = Instant::now();
        player.start(t0).unwrap();
        assert_eq!(shape(player.tick(t0 + Duration::from_millis(100))), MouthShape::X);
        assert_eq!(shape(player.tick(t0 + Duration::from_millis(250))), MouthShape::C);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finishes_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = player();
        player
            .load(entry(&dir, 0.5, vec![MouthCue::new(0.0, 0.5, MouthShape::D)]))
            .unwrap();
        player.start(Instant::now()).unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        match player.tick(Instant::now()) {
            Some(PlayerUpdate::Finished(entry)) => assert_eq!(entry.seq(), SequenceNumber::FIRST),
            other => panic!("expected finished, got {other:?}"),
        }
        assert!(player.tick(Instant::now()).is_none());
        assert!(!player.is_playing());
        assert_eq!(player.current_shape(), MouthShape::X);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_and_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = player();
        assert!(matches!(
            player.start(Instant::now()),
            Err(PlaybackError::NotLoaded)
        ));

        player.load(entry(&dir, 1.0, vec![])).unwrap();
        player.start(Instant::now()).unwrap();
        assert!(matches!(player.load(entry(&dir, 1.0, vec![])), Err(PlaybackError::Busy)));
        assert!(matches!(player.start(Instant::now()), Err(PlaybackError::Busy)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resets_mouth() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = player();
        player
            .load(entry(&dir, 1.0, vec![MouthCue::new(0.0, 1.0, MouthShape::E)]))
            .unwrap();
        let t0 = Instant::now();
        player.start(t0).unwrap();
        assert_eq!(shape(player.tick(t0 + Duration::from_millis(100))), MouthShape::E);

        let stopped = player.stop().unwrap();
        assert_eq!(stopped.seq(), SequenceNumber::FIRST);
        assert!(!player.is_playing());
        assert_eq!(player.current_shape(), MouthShape::X);
        assert!(player.tick(Instant::now()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_asset_fails_start() {
        let mut player = player();
        let missing = PlaybackEntry::new(
            Sentence::new(SequenceNumber::FIRST, "Gone.").unwrap(),
            DisplayTarget::new(ReplyId::new(1)),
            AudioAsset::new("/nonexistent/gone.wav", Duration::from_secs(1)),
            VisemeTimeline::default(),
        );
        player.load(missing).unwrap();
        assert!(matches!(
            player.start(Instant::now()),
            Err(PlaybackError::MissingAsset(_))
        ));
        assert!(!player.is_playing());
    }
}
