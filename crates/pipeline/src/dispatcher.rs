//! Synthesis + extraction jobs
//!
//! Each sentence gets its own task: synthesize to a uniquely named WAV, then
//! extract visemes from it. Jobs run concurrently up to a limit and report
//! back over one channel, in completion order. The scheduler restores
//! sentence order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use avatar_config::{ExtractionConfig, SynthesisConfig};
use avatar_core::{
    AudioAsset, DisplayTarget, ExtractionError, PlaybackEntry, Sentence, SequenceNumber, SpeechSynthesizer,
    SynthesisError, VisemeExtractor,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::AbortHandle;

use crate::PipelineError;

/// Picks asset file names: `{dir}/{prefix}_{unix_millis}_{seq}.wav`
#[derive(Debug, Clone)]
pub struct AssetNamer {
    dir: PathBuf,
    prefix: String,
}

impl AssetNamer {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &SynthesisConfig) -> Self {
        Self::new(&config.asset_dir, &config.file_prefix)
    }

    /// Path for the audio of sentence `seq`
    pub fn audio_path(&self, seq: SequenceNumber) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.dir.join(format!("{}_{}_{}.wav", self.prefix, millis, seq))
    }

    /// Path for a placeholder (silent) asset standing in for sentence `seq`
    pub fn placeholder_path(&self, seq: SequenceNumber) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.dir
            .join(format!("{}_{}_{}_silence.wav", self.prefix, millis, seq))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the asset directory if needed
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }
}

/// A job that could not produce a playback entry
#[derive(Debug)]
pub struct JobFailure {
    pub sentence: Sentence,
    pub target: DisplayTarget,
    pub error: PipelineError,
}

/// What a finished job reports
#[derive(Debug)]
pub enum JobOutcome {
    Ready(PlaybackEntry),
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn seq(&self) -> SequenceNumber {
        match self {
            JobOutcome::Ready(entry) => entry.seq(),
            JobOutcome::Failed(failure) => failure.sentence.seq(),
        }
    }
}

/// Everything a job needs, shared across jobs
struct JobContext {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    extractor: Arc<dyn VisemeExtractor>,
    namer: AssetNamer,
    synthesis_timeout: Duration,
    extraction_timeout: Duration,
    cleanup_assets: bool,
    permits: Semaphore,
}

/// Launches and tracks per-sentence jobs
pub struct JobDispatcher {
    context: Arc<JobContext>,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
    in_flight: Arc<Mutex<HashMap<SequenceNumber, AbortHandle>>>,
}

impl JobDispatcher {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        extractor: Arc<dyn VisemeExtractor>,
        synthesis: &SynthesisConfig,
        extraction: &ExtractionConfig,
        cleanup_assets: bool,
        outcomes: mpsc::UnboundedSender<JobOutcome>,
    ) -> Self {
        let context = JobContext {
            synthesizer,
            extractor,
            namer: AssetNamer::from_config(synthesis),
            synthesis_timeout: Duration::from_millis(synthesis.timeout_ms),
            extraction_timeout: Duration::from_millis(extraction.timeout_ms),
            cleanup_assets,
            permits: Semaphore::new(synthesis.max_concurrent_jobs.max(1)),
        };

        Self {
            context: Arc::new(context),
            outcomes,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start the job for one sentence. Returns immediately.
    pub fn dispatch(&self, sentence: Sentence, target: DisplayTarget) {
        let seq = sentence.seq();
        let context = self.context.clone();
        let outcomes = self.outcomes.clone();
        let in_flight = self.in_flight.clone();

        tracing::debug!(seq = %seq, reply = %target.reply_id, text = %sentence.text(), "Dispatching sentence");

        // Registered before the task can deregister itself
        let mut registry = self.in_flight.lock();
        let handle = tokio::spawn(async move {
            let outcome = run_job(&context, sentence, target).await;
            in_flight.lock().remove(&seq);
            if outcomes.send(outcome).is_err() {
                tracing::debug!(seq = %seq, "Outcome receiver gone");
            }
        });
        registry.insert(seq, handle.abort_handle());
    }

    /// Abort every running job. Aborted jobs never report.
    pub fn cancel_all(&self) -> usize {
        let handles: Vec<_> = self.in_flight.lock().drain().collect();
        for (seq, handle) in &handles {
            tracing::debug!(seq = %seq, "Cancelling job");
            handle.abort();
        }
        handles.len()
    }

    /// Jobs started but not yet reported
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn namer(&self) -> &AssetNamer {
        &self.context.namer
    }
}

impl Drop for JobDispatcher {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn run_job(context: &JobContext, sentence: Sentence, target: DisplayTarget) -> JobOutcome {
    let failed = |sentence, error: PipelineError| {
        JobOutcome::Failed(JobFailure {
            sentence,
            target,
            error,
        })
    };

    let _permit = match context.permits.acquire().await {
        Ok(permit) => permit,
        Err(_) => return failed(sentence, PipelineError::ChannelClosed),
    };

    let output = context.namer.audio_path(sentence.seq());
    let assets = AssetGuard::new(&output, context.cleanup_assets);
    let synthesis = tokio::time::timeout(
        context.synthesis_timeout,
        context.synthesizer.synthesize(sentence.text(), &output),
    )
    .await;

    let audio = match synthesis {
        Ok(Ok(audio)) => audio,
        Ok(Err(e)) => return failed(sentence, e.into()),
        Err(_) => {
            let e = SynthesisError::Timeout(context.synthesis_timeout.as_millis() as u64);
            return failed(sentence, e.into());
        }
    };

    let extraction =
        tokio::time::timeout(context.extraction_timeout, context.extractor.extract(&audio)).await;

    match extraction {
        Ok(Ok(timeline)) => {
            assets.release();
            JobOutcome::Ready(PlaybackEntry::new(sentence, target, audio, timeline))
        }
        Ok(Err(e)) => failed(sentence, e.into()),
        Err(_) => {
            let e = ExtractionError::Timeout(context.extraction_timeout.as_millis() as u64);
            failed(sentence, e.into())
        }
    }
}

/// Owns a job's files until they leave in a ready entry. Failed, timed out
/// and aborted jobs drop it, deleting whatever synthesis wrote.
struct AssetGuard {
    asset: Option<AudioAsset>,
}

impl AssetGuard {
    fn new(output: &Path, cleanup: bool) -> Self {
        Self {
            asset: cleanup.then(|| AudioAsset::new(output, Duration::ZERO)),
        }
    }

    fn release(mut self) {
        self.asset = None;
    }
}

impl Drop for AssetGuard {
    fn drop(&mut self) {
        let Some(asset) = self.asset.take() else {
            return;
        };
        match asset.remove_files() {
            Ok(()) => tracing::trace!(path = %asset.path().display(), "Removed job assets"),
            Err(e) => {
                tracing::warn!(path = %asset.path().display(), "Failed to remove job assets: {}", e)
            }
        }
    }
}
