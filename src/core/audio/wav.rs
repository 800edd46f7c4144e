//! WAV file stand-ins for audio devices.
//!
//! [`WavMicrophone`] replays a file as if it were a live microphone.
//! [`WavRecorder`] writes scheduled agent audio to a file, keeping the
//! timeline by padding gaps with silence.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::capture::{InputFrame, MicrophoneSource, MicrophoneStream};
use super::pcm::{LinearResampler, f32_to_i16, i16_to_f32};
use super::playback::AudioOutput;
use crate::core::session::AudioChunk;
use crate::errors::DeviceError;

/// Frame length delivered by [`WavMicrophone`].
const FRAME_MS: u64 = 20;

/// Decoded WAV contents as interleaved floats.
#[derive(Debug, Clone)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl WavClip {
    /// Read and normalize a WAV file (integer or float samples).
    pub fn read(path: &Path) -> Result<Self, DeviceError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

// =============================================================================
// Microphone
// =============================================================================

/// Replays a WAV file in real time, then keeps delivering silence.
///
/// Trailing silence lets the remote end-of-speech detection close the turn.
#[derive(Debug, Clone)]
pub struct WavMicrophone {
    path: PathBuf,
}

impl WavMicrophone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MicrophoneSource for WavMicrophone {
    async fn open(&self) -> Result<MicrophoneStream, DeviceError> {
        let path = self.path.clone();
        let clip = tokio::task::spawn_blocking(move || WavClip::read(&path))
            .await
            .map_err(|e| DeviceError::Io(e.to_string()))??;

        if clip.sample_rate == 0 || clip.channels == 0 {
            return Err(DeviceError::Format("empty WAV format".to_string()));
        }

        tracing::info!(
            path = %self.path.display(),
            rate = clip.sample_rate,
            channels = clip.channels,
            duration_ms = clip.duration().as_millis() as u64,
            "Replaying WAV as microphone"
        );

        let (tx, rx) = mpsc::channel(16);
        let release = CancellationToken::new();
        tokio::spawn(pace_clip(clip, tx, release.clone()));
        Ok(MicrophoneStream::new(rx, Some(release)))
    }
}

async fn pace_clip(
    clip: WavClip,
    tx: mpsc::Sender<Result<InputFrame, DeviceError>>,
    release: CancellationToken,
) {
    let frame_len =
        (clip.sample_rate as u64 * FRAME_MS / 1000) as usize * clip.channels as usize;
    let frame_len = frame_len.max(clip.channels as usize);
    let mut interval = tokio::time::interval(Duration::from_millis(FRAME_MS));
    let mut offset = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = release.cancelled() => break,
            _ = interval.tick() => {}
        }

        let samples = if offset < clip.samples.len() {
            let end = (offset + frame_len).min(clip.samples.len());
            let mut block = clip.samples[offset..end].to_vec();
            block.resize(frame_len, 0.0);
            offset = end;
            block
        } else {
            vec![0.0; frame_len]
        };

        let frame = InputFrame {
            samples,
            sample_rate: clip.sample_rate,
            channels: clip.channels,
        };
        if tx.send(Ok(frame)).await.is_err() {
            break;
        }
    }
    tracing::debug!("WAV microphone released");
}

// =============================================================================
// Recorder
// =============================================================================

struct RecorderState {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    written_until: Option<Instant>,
    resampler: Option<LinearResampler>,
    samples_written: u64,
}

/// Writes agent audio to a mono 16-bit WAV file.
pub struct WavRecorder {
    path: PathBuf,
    sample_rate: u32,
    state: Mutex<RecorderState>,
}

impl std::fmt::Debug for WavRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavRecorder")
            .field("path", &self.path)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl WavRecorder {
    pub fn create(path: impl Into<PathBuf>, sample_rate: u32) -> Result<Self, DeviceError> {
        let path = path.into();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)?;
        tracing::info!(path = %path.display(), sample_rate, "Recording agent audio");

        Ok(Self {
            path,
            sample_rate,
            state: Mutex::new(RecorderState {
                writer: Some(writer),
                written_until: None,
                resampler: None,
                samples_written: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples written so far, including padding.
    pub fn samples_written(&self) -> u64 {
        self.state.lock().samples_written
    }

    /// Flush the header and close the file. Later chunks are ignored.
    pub fn finalize(&self) -> Result<(), DeviceError> {
        let writer = self.state.lock().writer.take();
        if let Some(writer) = writer {
            writer.finalize()?;
            tracing::info!(path = %self.path.display(), "Recording finalized");
        }
        Ok(())
    }
}

impl AudioOutput for WavRecorder {
    fn play(&self, start_at: Instant, chunk: &AudioChunk) -> Result<(), DeviceError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(writer) = state.writer.as_mut() else {
            return Ok(());
        };

        if let Some(until) = state.written_until
            && start_at > until
        {
            let gap = start_at - until;
            let pad = (gap.as_secs_f64() * self.sample_rate as f64).round() as u64;
            for _ in 0..pad {
                writer.write_sample(0i16)?;
            }
            state.samples_written += pad;
        }

        if chunk.sample_rate == self.sample_rate {
            for &sample in chunk.samples.iter() {
                writer.write_sample(sample)?;
            }
            state.samples_written += chunk.len() as u64;
        } else {
            if state
                .resampler
                .as_ref()
                .is_none_or(|r| r.from_rate() != chunk.sample_rate)
            {
                state.resampler = Some(LinearResampler::new(chunk.sample_rate, self.sample_rate));
            }
            let input: Vec<f32> = chunk.samples.iter().copied().map(i16_to_f32).collect();
            let output = match state.resampler.as_mut() {
                Some(r) => r.process(&input),
                None => input,
            };
            for &sample in &output {
                writer.write_sample(f32_to_i16(sample))?;
            }
            state.samples_written += output.len() as u64;
        }

        state.written_until = Some(start_at + chunk.duration());
        Ok(())
    }

    fn halt(&self) {
        // Audio already handed over stays in the file; the timeline restarts.
        self.state.lock().written_until = None;
    }
}
