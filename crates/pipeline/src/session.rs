//! Avatar session
//!
//! Owns the whole speech path for one conversation. Text goes in through
//! `push_text`/`finish_reply`; presentation events come out of `subscribe`.
//!
//! The scheduler and the player live inside a single control-loop task. Job
//! results and commands reach it over channels and the lip-sync clock ticks
//! in the same `select!`, so every transition is serialized.

use std::sync::Arc;
use std::time::Duration;

use avatar_config::{
    ExtractionConfig, FailurePolicy, PlaybackConfig, SegmenterConfig, Settings, SynthesisConfig,
};
use avatar_core::{
    AudioAsset, AudioOutput, DisplayTarget, MouthShape, PlaybackEntry, ReplyId, SequenceNumber,
    SpeechSynthesizer, VisemeExtractor,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatcher::{AssetNamer, JobDispatcher, JobFailure, JobOutcome};
use crate::player::{LipSyncPlayer, PlayerUpdate};
use crate::scheduler::{PlaybackScheduler, SchedulerState, Submission};
use crate::segmenter::SentenceSegmenter;
use crate::PipelineError;

/// Presentation events
#[derive(Debug, Clone, PartialEq)]
pub enum AvatarEvent {
    /// Sentence is about to be heard; show its text in the target bubble
    SentenceReady {
        seq: SequenceNumber,
        target: DisplayTarget,
        text: String,
        /// Silent stand-in for a failed sentence
        placeholder: bool,
    },
    /// Audio started
    PlaybackStarted { seq: SequenceNumber },
    /// Mouth shape for the current tick
    Mouth {
        seq: SequenceNumber,
        elapsed: Duration,
        shape: MouthShape,
    },
    /// Audio reached its end
    PlaybackFinished { seq: SequenceNumber },
    /// Sentence could not be synthesized, extracted or played
    SentenceFailed {
        seq: SequenceNumber,
        target: DisplayTarget,
        text: String,
        error: String,
    },
    /// Queue drained
    Idle,
}

/// Session configuration
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub segmenter: SegmenterConfig,
    pub synthesis: SynthesisConfig,
    pub extraction: ExtractionConfig,
    pub playback: PlaybackConfig,
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            segmenter: settings.segmenter.clone(),
            synthesis: settings.synthesis.clone(),
            extraction: settings.extraction.clone(),
            playback: settings.playback.clone(),
        }
    }
}

/// Snapshot of the control loop, published after every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: SchedulerState,
    /// Sequence number playback is waiting for
    pub next_expected: SequenceNumber,
}

enum Command {
    Clear {
        next: SequenceNumber,
        done: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Streaming text in, lip-synced speech out
pub struct AvatarSession {
    segmenter: Mutex<SentenceSegmenter>,
    dispatcher: JobDispatcher,
    commands: mpsc::UnboundedSender<Command>,
    /// Event broadcaster
    event_tx: broadcast::Sender<AvatarEvent>,
    status_rx: watch::Receiver<PlaybackStatus>,
    next_reply: Mutex<ReplyId>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl AvatarSession {
    /// Create a session and start its control loop. Must be called from
    /// within a tokio runtime.
    pub fn new(
        config: SessionConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        extractor: Arc<dyn VisemeExtractor>,
        output: Arc<dyn AudioOutput>,
    ) -> Result<Self, PipelineError> {
        let namer = AssetNamer::from_config(&config.synthesis);
        namer.ensure_dir()?;

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(config.playback.event_capacity.max(16));
        let (status_tx, status_rx) = watch::channel(PlaybackStatus {
            state: SchedulerState::Idle,
            next_expected: SequenceNumber::FIRST,
        });

        let dispatcher = JobDispatcher::new(
            synthesizer.clone(),
            extractor.clone(),
            &config.synthesis,
            &config.extraction,
            config.playback.cleanup_assets,
            outcome_tx,
        );

        tracing::info!(
            synthesizer = synthesizer.name(),
            extractor = extractor.name(),
            output = output.name(),
            asset_dir = %namer.dir().display(),
            failure_policy = ?config.playback.failure_policy,
            "Avatar session started"
        );

        let control = ControlLoop {
            scheduler: PlaybackScheduler::new(SequenceNumber::FIRST),
            player: LipSyncPlayer::new(output),
            events: event_tx.clone(),
            status: status_tx,
            namer,
            playback: config.playback.clone(),
        };
        let handle = tokio::spawn(control.run(outcome_rx, command_rx));

        Ok(Self {
            segmenter: Mutex::new(SentenceSegmenter::new(&config.segmenter)),
            dispatcher,
            commands: command_tx,
            event_tx,
            status_rx,
            next_reply: Mutex::new(ReplyId::new(1)),
            control: Mutex::new(Some(handle)),
        })
    }

    /// Subscribe to presentation events
    pub fn subscribe(&self) -> broadcast::Receiver<AvatarEvent> {
        self.event_tx.subscribe()
    }

    /// Allocate the display target for a new assistant reply
    pub fn begin_reply(&self) -> DisplayTarget {
        let mut next = self.next_reply.lock();
        let id = *next;
        *next = id.next();
        DisplayTarget::new(id)
    }

    /// Feed one streamed fragment. Completed sentences are dispatched
    /// immediately; returns how many.
    pub fn push_text(&self, target: DisplayTarget, token: &str) -> usize {
        let mut segmenter = self.segmenter.lock();
        let sentences = segmenter.feed(token);
        let count = sentences.len();
        for sentence in sentences {
            self.dispatcher.dispatch(sentence, target);
        }
        count
    }

    /// End of the reply's stream: flush trailing text per policy
    pub fn finish_reply(&self, target: DisplayTarget) -> Option<SequenceNumber> {
        let mut segmenter = self.segmenter.lock();
        let sentence = segmenter.finish()?;
        let seq = sentence.seq();
        self.dispatcher.dispatch(sentence, target);
        Some(seq)
    }

    /// Speak a complete text as its own reply
    pub fn speak(&self, text: &str) -> DisplayTarget {
        let target = self.begin_reply();
        self.push_text(target, text);
        self.finish_reply(target);
        target
    }

    /// Drop everything pending: buffered text, running jobs, queued and
    /// playing entries. Sequence numbering continues.
    pub async fn clear(&self) -> Result<(), PipelineError> {
        let next = {
            let mut segmenter = self.segmenter.lock();
            segmenter.reset();
            let cancelled = self.dispatcher.cancel_all();
            tracing::debug!(cancelled, "Cancelled in-flight jobs");
            segmenter.next_seq()
        };

        let (done, ack) = oneshot::channel();
        self.commands
            .send(Command::Clear { next, done })
            .map_err(|_| PipelineError::NotRunning)?;
        ack.await.map_err(|_| PipelineError::NotRunning)
    }

    /// Latest control-loop snapshot
    pub fn status(&self) -> PlaybackStatus {
        *self.status_rx.borrow()
    }

    /// Nothing playing and every allocated sentence resolved
    pub fn is_idle(&self) -> bool {
        self.is_drained(&self.status())
    }

    /// Wait until every sentence dispatched so far has been played or
    /// dropped
    pub async fn wait_idle(&self) -> Result<(), PipelineError> {
        let mut status_rx = self.status_rx.clone();
        loop {
            let status = *status_rx.borrow_and_update();
            if self.is_drained(&status) {
                return Ok(());
            }
            status_rx
                .changed()
                .await
                .map_err(|_| PipelineError::NotRunning)?;
        }
    }

    /// Stop the control loop and cancel all jobs
    pub async fn shutdown(&self) {
        self.dispatcher.cancel_all();
        let _ = self.commands.send(Command::Shutdown);

        let handle = self.control.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Control loop ended abnormally: {}", e);
            }
        }
    }

    fn is_drained(&self, status: &PlaybackStatus) -> bool {
        status.state == SchedulerState::Idle
            && status.next_expected >= self.segmenter.lock().next_seq()
    }
}

/// Scheduler + player, owned by one task
struct ControlLoop {
    scheduler: PlaybackScheduler,
    player: LipSyncPlayer,
    events: broadcast::Sender<AvatarEvent>,
    status: watch::Sender<PlaybackStatus>,
    namer: AssetNamer,
    playback: PlaybackConfig,
}

impl ControlLoop {
    async fn run(
        mut self,
        mut outcomes: mpsc::UnboundedReceiver<JobOutcome>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let period = Duration::from_millis(self.playback.tick_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(outcome) = outcomes.recv() => self.on_outcome(outcome),
                command = commands.recv() => match command {
                    Some(Command::Clear { next, done }) => {
                        self.clear(next);
                        self.publish_status();
                        let _ = done.send(());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                _ = ticker.tick(), if self.player.is_playing() => self.on_tick(),
            }
            self.publish_status();
        }

        if let Some(entry) = self.player.stop() {
            self.discard(&entry);
        }
        let next = self.scheduler.next_expected();
        for entry in self.scheduler.reset(next) {
            self.discard(&entry);
        }
        tracing::debug!("Control loop stopped");
    }

    fn on_outcome(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Ready(entry) => {
                tracing::debug!(seq = %entry.seq(), "Sentence ready");
                match self.scheduler.submit(entry) {
                    Submission::Start(entry) => self.start(entry),
                    Submission::Held => {}
                    Submission::Rejected(entry) => self.discard(&entry),
                }
            }
            JobOutcome::Failed(failure) => self.on_failure(failure),
        }
    }

    fn on_failure(&mut self, failure: JobFailure) {
        let JobFailure {
            sentence,
            target,
            error,
        } = failure;
        let seq = sentence.seq();

        if seq < self.scheduler.next_expected() {
            tracing::debug!(seq = %seq, "Ignoring failure of cleared sentence");
            return;
        }

        tracing::warn!(seq = %seq, text = %sentence.text(), "Sentence failed: {}", error);
        let _ = self.events.send(AvatarEvent::SentenceFailed {
            seq,
            target,
            text: sentence.text().to_string(),
            error: error.to_string(),
        });

        let next = match self.playback.failure_policy {
            FailurePolicy::Skip => self.scheduler.fail(seq),
            FailurePolicy::Placeholder => {
                let duration = Duration::from_millis(self.playback.placeholder_ms);
                let path = self.namer.placeholder_path(seq);
                match AudioAsset::write_silence(path, duration, self.playback.placeholder_sample_rate)
                {
                    Ok(silence) => {
                        let entry = PlaybackEntry::placeholder(sentence, target, silence);
                        match self.scheduler.submit(entry) {
                            Submission::Start(entry) => Some(entry),
                            Submission::Held => None,
                            Submission::Rejected(entry) => {
                                self.discard(&entry);
                                None
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(seq = %seq, "Failed to write placeholder, skipping: {}", e);
                        self.scheduler.fail(seq)
                    }
                }
            }
        };

        if let Some(entry) = next {
            self.start(entry);
        }
    }

    /// Start `entry`; when it cannot play, report it and move on
    fn start(&mut self, entry: PlaybackEntry) {
        let mut next = Some(entry);

        while let Some(entry) = next.take() {
            let seq = entry.seq();
            let target = entry.target();
            let text = entry.sentence().text().to_string();
            let placeholder = entry.is_placeholder();

            if let Err(e) = self.player.load(entry) {
                tracing::error!(seq = %seq, "Player refused entry: {}", e);
                return;
            }

            match self.player.start(Instant::now()) {
                Ok(()) => {
                    tracing::debug!(seq = %seq, placeholder, "Playing sentence");
                    let _ = self.events.send(AvatarEvent::SentenceReady {
                        seq,
                        target,
                        text,
                        placeholder,
                    });
                    let _ = self.events.send(AvatarEvent::PlaybackStarted { seq });
                    return;
                }
                Err(e) => {
                    tracing::warn!(seq = %seq, text = %text, "Playback failed to start: {}", e);
                    let _ = self.events.send(AvatarEvent::SentenceFailed {
                        seq,
                        target,
                        text,
                        error: e.to_string(),
                    });
                    if let Some(entry) = self.player.stop() {
                        self.discard(&entry);
                    }
                    next = self.scheduler.on_playback_finished();
                }
            }
        }

        let _ = self.events.send(AvatarEvent::Idle);
    }

    fn on_tick(&mut self) {
        match self.player.tick(Instant::now()) {
            Some(PlayerUpdate::Frame {
                seq,
                elapsed,
                shape,
            }) => {
                let _ = self.events.send(AvatarEvent::Mouth {
                    seq,
                    elapsed,
                    shape,
                });
            }
            Some(PlayerUpdate::Finished(entry)) => {
                let seq = entry.seq();
                tracing::debug!(seq = %seq, "Playback finished");
                let _ = self.events.send(AvatarEvent::PlaybackFinished { seq });
                self.discard(&entry);

                match self.scheduler.on_playback_finished() {
                    Some(next) => self.start(next),
                    None => {
                        let _ = self.events.send(AvatarEvent::Idle);
                    }
                }
            }
            None => {}
        }
    }

    fn clear(&mut self, next: SequenceNumber) {
        if let Some(entry) = self.player.stop() {
            self.discard(&entry);
        }
        let dropped = self.scheduler.reset(next);
        for entry in &dropped {
            self.discard(entry);
        }

        tracing::info!(next = %self.scheduler.next_expected(), dropped = dropped.len(), "Playback cleared");
        let _ = self.events.send(AvatarEvent::Idle);
    }

    fn discard(&self, entry: &PlaybackEntry) {
        if !self.playback.cleanup_assets {
            return;
        }
        if let Err(e) = entry.audio().remove_files() {
            tracing::warn!(
                seq = %entry.seq(),
                path = %entry.audio().path().display(),
                "Failed to remove asset: {}",
                e
            );
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(PlaybackStatus {
            state: self.scheduler.state(),
            next_expected: self.scheduler.next_expected(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ClockOutput;
    use async_trait::async_trait;
    use avatar_core::{ExtractionError, MouthCue, SynthesisError, VisemeTimeline};
    use std::path::Path;

    struct InstantSynth;

    #[async_trait]
    impl SpeechSynthesizer for InstantSynth {
        async fn synthesize(&self, _text: &str, output: &Path) -> Result<AudioAsset, SynthesisError> {
            AudioAsset::write_silence(output, Duration::from_millis(100), 8000)
                .map_err(|e| SynthesisError::InvalidAudio(e.to_string()))
        }

        fn name(&self) -> &str {
            "instant"
        }
    }

    struct OpenMouth;

    #[async_trait]
    impl VisemeExtractor for OpenMouth {
        async fn extract(&self, audio: &AudioAsset) -> Result<VisemeTimeline, ExtractionError> {
            let end = audio.duration().as_secs_f64();
            Ok(VisemeTimeline::new(vec![MouthCue::new(0.0, end, MouthShape::D)]))
        }

        fn name(&self) -> &str {
            "open"
        }
    }

    fn session(dir: &Path) -> AvatarSession {
        let mut config = SessionConfig::default();
        config.synthesis.asset_dir = dir.to_string_lossy().into_owned();
        AvatarSession::new(
            config,
            Arc::new(InstantSynth),
            Arc::new(OpenMouth),
            Arc::new(ClockOutput),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_creation() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        assert!(session.is_idle());
        assert_eq!(session.status().state, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_targets_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let first = session.begin_reply();
        let second = session.begin_reply();
        assert_ne!(first, second);
        assert_eq!(second.reply_id, ReplyId::new(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_plays_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let mut events = session.subscribe();

        let target = session.speak("Hi there.");
        session.wait_idle().await.unwrap();

        let mut mouths = 0;
        let mut saw_ready = false;
        while let Ok(event) = events.try_recv() {
            match event {
                AvatarEvent::SentenceReady { target: t, text, .. } => {
                    assert_eq!(t, target);
                    assert_eq!(text, "Hi there.");
                    saw_ready = true;
                }
                AvatarEvent::Mouth { shape, .. } => {
                    assert_eq!(shape, MouthShape::D);
                    mouths += 1;
                }
                _ => {}
            }
        }
        assert!(saw_ready);
        assert!(mouths > 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        session.shutdown().await;
        assert!(matches!(session.clear().await, Err(PipelineError::NotRunning)));
    }
}
