//! System audio devices through cpal.
//!
//! cpal streams are not `Send` on every platform, so each stream is built and
//! kept alive on its own thread until the owning handle is dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::capture::{InputFrame, MicrophoneSource, MicrophoneStream};
use super::pcm::{LinearResampler, i16_to_f32};
use super::playback::AudioOutput;
use crate::core::session::AudioChunk;
use crate::errors::DeviceError;

fn build_error(err: cpal::BuildStreamError) -> DeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            DeviceError::Unavailable("device not available".to_string())
        }
        cpal::BuildStreamError::StreamConfigNotSupported => {
            DeviceError::Format("stream config not supported".to_string())
        }
        other => DeviceError::Io(other.to_string()),
    }
}

/// Keep `stream` alive on the current thread until `release` is cancelled.
fn hold_stream(stream: cpal::Stream, release: CancellationToken) {
    futures::executor::block_on(release.cancelled());
    drop(stream);
}

// =============================================================================
// Input
// =============================================================================

/// Default system input device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

#[async_trait]
impl MicrophoneSource for CpalMicrophone {
    async fn open(&self) -> Result<MicrophoneStream, DeviceError> {
        let (tx, rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let release = CancellationToken::new();
        let thread_release = release.clone();

        thread::Builder::new()
            .name("cpal-input".to_string())
            .spawn(move || match open_input(tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    hold_stream(stream, thread_release);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DeviceError::Io(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| DeviceError::Io("input thread exited".to_string()))??;
        Ok(MicrophoneStream::new(rx, Some(release)))
    }
}

fn open_input(
    tx: mpsc::Sender<Result<InputFrame, DeviceError>>,
) -> Result<cpal::Stream, DeviceError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| DeviceError::Unavailable("no input device".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| DeviceError::PermissionDenied(e.to_string()))?;

    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        rate = supported.sample_rate().0,
        channels = supported.channels(),
        "Opening input device"
    );

    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let stream = match format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, tx),
        SampleFormat::I16 => build_input::<i16>(&device, &config, tx),
        SampleFormat::U16 => build_input::<u16>(&device, &config, tx),
        other => {
            return Err(DeviceError::Format(format!("sample format {other:?}")));
        }
    }?;
    stream
        .play()
        .map_err(|e| DeviceError::Io(e.to_string()))?;
    Ok(stream)
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::Sender<Result<InputFrame, DeviceError>>,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let err_tx = tx.clone();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let frame = InputFrame {
                    samples: data.iter().map(|&s| f32::from_sample(s)).collect(),
                    sample_rate,
                    channels,
                };
                if tx.try_send(Ok(frame)).is_err() {
                    tracing::trace!("Input frame dropped");
                }
            },
            move |err| {
                tracing::warn!("Input stream error: {}", err);
                let _ = err_tx.try_send(Err(DeviceError::Disconnected(err.to_string())));
            },
            None,
        )
        .map_err(build_error)
}

// =============================================================================
// Output
// =============================================================================

struct OutputBuffer {
    samples: VecDeque<f32>,
    resampler: Option<LinearResampler>,
}

/// Default system output device.
///
/// Chunks are appended to a buffer the device callback drains. A chunk that
/// starts later than the buffered audio ends is preceded by silence.
pub struct CpalSpeaker {
    buffer: Arc<Mutex<OutputBuffer>>,
    sample_rate: u32,
    _release: DropGuard,
}

impl std::fmt::Debug for CpalSpeaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalSpeaker")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl CpalSpeaker {
    pub fn open() -> Result<Self, DeviceError> {
        let buffer = Arc::new(Mutex::new(OutputBuffer {
            samples: VecDeque::new(),
            resampler: None,
        }));
        let release = CancellationToken::new();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread_buffer = buffer.clone();
        let thread_release = release.clone();
        thread::Builder::new()
            .name("cpal-output".to_string())
            .spawn(move || match open_output(thread_buffer) {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    hold_stream(stream, thread_release);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DeviceError::Io(e.to_string()))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| DeviceError::Io("output thread exited".to_string()))??;

        Ok(Self {
            buffer,
            sample_rate,
            _release: release.drop_guard(),
        })
    }
}

fn open_output(buffer: Arc<Mutex<OutputBuffer>>) -> Result<(cpal::Stream, u32), DeviceError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| DeviceError::Unavailable("no output device".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(DeviceError::Format(format!(
            "output sample format {:?}",
            supported.sample_format()
        )));
    }

    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels.max(1) as usize;
    let rate = config.sample_rate.0;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut buffer = buffer.lock();
                for frame in data.chunks_mut(channels) {
                    let sample = buffer.samples.pop_front().unwrap_or(0.0);
                    frame.fill(sample);
                }
            },
            |err| tracing::warn!("Output stream error: {}", err),
            None,
        )
        .map_err(build_error)?;
    stream
        .play()
        .map_err(|e| DeviceError::Io(e.to_string()))?;
    tracing::info!(rate, channels, "Output device open");
    Ok((stream, rate))
}

impl AudioOutput for CpalSpeaker {
    fn play(&self, start_at: Instant, chunk: &AudioChunk) -> Result<(), DeviceError> {
        let mut buffer = self.buffer.lock();

        // Pad up to the requested start.
        let buffered = buffer.samples.len() as f64 / self.sample_rate as f64;
        let lead = start_at
            .saturating_duration_since(Instant::now())
            .as_secs_f64();
        if lead > buffered {
            let pad = ((lead - buffered) * self.sample_rate as f64) as usize;
            buffer.samples.extend(std::iter::repeat_n(0.0, pad));
        }

        let input: Vec<f32> = chunk.samples.iter().copied().map(i16_to_f32).collect();
        if chunk.sample_rate == self.sample_rate {
            buffer.samples.extend(input);
        } else {
            if buffer
                .resampler
                .as_ref()
                .is_none_or(|r| r.from_rate() != chunk.sample_rate)
            {
                buffer.resampler = Some(LinearResampler::new(chunk.sample_rate, self.sample_rate));
            }
            let output = match buffer.resampler.as_mut() {
                Some(r) => r.process(&input),
                None => input,
            };
            buffer.samples.extend(output);
        }
        Ok(())
    }

    fn halt(&self) {
        let mut buffer = self.buffer.lock();
        buffer.samples.clear();
        if let Some(r) = buffer.resampler.as_mut() {
            r.reset();
        }
    }
}
