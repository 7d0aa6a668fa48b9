//! Audio outputs
//!
//! - `ClockOutput`: silent, finishes after the asset's duration. Default for
//!   headless runs and tests.
//! - `DeviceOutput`: plays through the default sound device (feature
//!   `audio-device`).

use std::time::Duration;

use avatar_core::{AudioAsset, AudioOutput, AudioPlayback, PlaybackError};
use tokio::time::Instant;

/// Output that only keeps time
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockOutput;

impl ClockOutput {
    pub fn new() -> Self {
        Self
    }
}

struct ClockPlayback {
    started: Instant,
    duration: Duration,
    stopped: bool,
}

impl AudioPlayback for ClockPlayback {
    fn is_finished(&self) -> bool {
        self.stopped || self.started.elapsed() >= self.duration
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

impl AudioOutput for ClockOutput {
    fn play(&self, asset: &AudioAsset) -> Result<Box<dyn AudioPlayback>, PlaybackError> {
        if !asset.path().exists() {
            return Err(PlaybackError::MissingAsset(asset.path().to_path_buf()));
        }

        Ok(Box::new(ClockPlayback {
            started: Instant::now(),
            duration: asset.duration(),
            stopped: false,
        }))
    }

    fn name(&self) -> &str {
        "clock"
    }
}

#[cfg(feature = "audio-device")]
pub use device::DeviceOutput;

#[cfg(feature = "audio-device")]
mod device {
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use avatar_core::{AudioAsset, AudioOutput, AudioPlayback, PlaybackError};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use parking_lot::Mutex;

    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Plays WAV assets on the default output device.
    ///
    /// Each playback owns a thread holding the cpal stream; the stream type
    /// is not `Send` on every host.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DeviceOutput;

    impl DeviceOutput {
        pub fn new() -> Self {
            Self
        }
    }

    struct DevicePlayback {
        finished: Arc<AtomicBool>,
        stop: Arc<AtomicBool>,
    }

    impl AudioPlayback for DevicePlayback {
        fn is_finished(&self) -> bool {
            self.finished.load(Ordering::Acquire)
        }

        fn stop(&mut self) {
            self.stop.store(true, Ordering::Release);
        }
    }

    impl Drop for DevicePlayback {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Release);
        }
    }

    /// Decoded mono samples
    struct Pcm {
        samples: Vec<f32>,
        sample_rate: u32,
    }

    fn decode(path: &Path) -> Result<Pcm, PlaybackError> {
        if !path.exists() {
            return Err(PlaybackError::MissingAsset(path.to_path_buf()));
        }

        let corrupt = |e: hound::Error| PlaybackError::CorruptAsset(e.to_string());
        let mut reader = hound::WavReader::open(path).map_err(corrupt)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(corrupt)?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(corrupt)?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Pcm {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Read position into the decoded samples, shared with the stream callback
    #[derive(Clone)]
    struct Feed {
        samples: Arc<Vec<f32>>,
        cursor: Arc<Mutex<usize>>,
        drained: Arc<AtomicBool>,
    }

    impl Feed {
        /// Fill interleaved stereo frames with the mono samples
        fn fill<T: Copy>(&self, data: &mut [T], convert: impl Fn(f32) -> T) {
            let mut position = self.cursor.lock();
            for frame in data.chunks_mut(2) {
                let sample = self.samples.get(*position).copied().unwrap_or(0.0);
                frame.fill(convert(sample));
                *position += 1;
            }
            if *position >= self.samples.len() {
                self.drained.store(true, Ordering::Release);
            }
        }
    }

    fn to_i16(sample: f32) -> i16 {
        (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }

    fn stream_error(err: cpal::StreamError) {
        tracing::warn!("Audio stream error: {}", err);
    }

    fn open_stream(pcm: Pcm, drained: Arc<AtomicBool>) -> Result<cpal::Stream, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("no output device".to_string()))?;

        // Stereo at the file's rate; many devices refuse mono
        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(pcm.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let feed = Feed {
            samples: Arc::new(pcm.samples),
            cursor: Arc::new(Mutex::new(0)),
            drained,
        };

        let f32_feed = feed.clone();
        let stream = match device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| f32_feed.fill(data, |s| s),
            stream_error,
            None,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("f32 output refused ({}), trying i16", e);
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            feed.fill(data, to_i16)
                        },
                        stream_error,
                        None,
                    )
                    .map_err(|e| PlaybackError::Device(e.to_string()))?
            }
        };

        stream
            .play()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        Ok(stream)
    }

    impl AudioOutput for DeviceOutput {
        fn play(&self, asset: &AudioAsset) -> Result<Box<dyn AudioPlayback>, PlaybackError> {
            let pcm = decode(asset.path())?;

            let finished = Arc::new(AtomicBool::new(false));
            let stop = Arc::new(AtomicBool::new(false));
            let (ready_tx, ready_rx) = std::sync::mpsc::channel();

            let thread_finished = finished.clone();
            let thread_stop = stop.clone();
            std::thread::spawn(move || {
                let drained = Arc::new(AtomicBool::new(false));
                match open_stream(pcm, drained.clone()) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        while !thread_stop.load(Ordering::Acquire)
                            && !drained.load(Ordering::Acquire)
                        {
                            std::thread::sleep(POLL_INTERVAL);
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                thread_finished.store(true, Ordering::Release);
            });

            ready_rx
                .recv()
                .map_err(|_| PlaybackError::Device("playback thread exited".to_string()))??;

            Ok(Box::new(DevicePlayback { finished, stop }))
        }

        fn name(&self) -> &str {
            "device"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn feed(samples: Vec<f32>) -> Feed {
            Feed {
                samples: Arc::new(samples),
                cursor: Arc::new(Mutex::new(0)),
                drained: Arc::new(AtomicBool::new(false)),
            }
        }

        #[test]
        fn test_i16_fallback_fills_both_channels() {
            let feed = feed(vec![0.5, -1.0]);
            let mut data = [0i16; 6];

            feed.fill(&mut data, to_i16);
            assert_eq!(data, [16383, 16383, -32767, -32767, 0, 0]);
            assert!(feed.drained.load(Ordering::Acquire));
        }

        #[test]
        fn test_drained_only_at_end() {
            let feed = feed(vec![0.1; 4]);
            let mut data = [0.0f32; 4];

            feed.fill(&mut data, |s| s);
            assert!(!feed.drained.load(Ordering::Acquire));
            feed.fill(&mut data, |s| s);
            assert!(feed.drained.load(Ordering::Acquire));
        }

        #[test]
        fn test_out_of_range_samples_clamp() {
            assert_eq!(to_i16(2.0), i16::MAX);
            assert_eq!(to_i16(-2.0), -i16::MAX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_output_finishes_after_duration() {
        let dir = tempfile::tempdir().unwrap();
        let asset = AudioAsset::write_silence(
            dir.path().join("a.wav"),
            Duration::from_millis(200),
            16000,
        )
        .unwrap();

        let playback = ClockOutput.play(&asset).unwrap();
        assert!(!playback.is_finished());

        tokio::time::advance(Duration::from_millis(199)).await;
        assert!(!playback.is_finished());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(playback.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_output_stop() {
        let dir = tempfile::tempdir().unwrap();
        let asset =
            AudioAsset::write_silence(dir.path().join("a.wav"), Duration::from_secs(1), 16000)
                .unwrap();

        let mut playback = ClockOutput.play(&asset).unwrap();
        playback.stop();
        assert!(playback.is_finished());
    }

    #[test]
    fn test_clock_output_missing_asset() {
        let asset = AudioAsset::new("/nonexistent/gone.wav", Duration::from_secs(1));
        assert!(matches!(
            ClockOutput.play(&asset),
            Err(PlaybackError::MissingAsset(_))
        ));
    }
}
