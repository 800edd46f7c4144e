//! Microphone capture pipeline.
//!
//! A [`MicrophoneSource`] yields interleaved float frames at the device rate.
//! [`PcmChunker`] down-mixes, resamples to 16kHz and cuts fixed-size PCM16
//! chunks, which [`CapturePipeline`] forwards to a [`ChunkSink`] while the
//! sink reports an open session.
//!
//! The device is held only while the pipeline is enabled. Disabling cancels
//! the capture task, which drops the [`MicrophoneStream`] and with it the
//! hardware stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::pcm::{LinearResampler, downmix, f32_to_i16};
use crate::core::session::{
    AudioChunk, INPUT_SAMPLE_RATE, LiveClient, StreamDirection, Topic,
};
use crate::errors::DeviceError;

/// Default chunk length.
pub const DEFAULT_CHUNK_MS: u64 = 40;

// =============================================================================
// Source and Sink Traits
// =============================================================================

/// One block of interleaved float samples from a capture device.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// An acquired microphone.
///
/// Frames arrive on `frames`. Dropping the stream releases the device.
pub struct MicrophoneStream {
    pub frames: mpsc::Receiver<Result<InputFrame, DeviceError>>,
    _release: Option<DropGuard>,
}

impl MicrophoneStream {
    /// Wrap a frame channel. `release` is cancelled when the stream is dropped.
    pub fn new(
        frames: mpsc::Receiver<Result<InputFrame, DeviceError>>,
        release: Option<CancellationToken>,
    ) -> Self {
        Self {
            frames,
            _release: release.map(CancellationToken::drop_guard),
        }
    }
}

impl std::fmt::Debug for MicrophoneStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrophoneStream").finish_non_exhaustive()
    }
}

/// Something that can acquire a microphone.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Acquire the device. Fails with a [`DeviceError`] when permission is
    /// denied or no device exists.
    async fn open(&self) -> Result<MicrophoneStream, DeviceError>;
}

/// Receiver of outbound chunks.
pub trait ChunkSink: Send + Sync {
    /// Whether chunks are currently accepted.
    fn is_open(&self) -> bool;
    fn send_audio(&self, chunk: &AudioChunk);
}

impl ChunkSink for LiveClient {
    fn is_open(&self) -> bool {
        LiveClient::is_open(self)
    }

    fn send_audio(&self, chunk: &AudioChunk) {
        self.send_audio_chunk(chunk);
    }
}

// =============================================================================
// Chunker
// =============================================================================

/// Converts device frames into fixed-size 16kHz PCM16 chunks.
#[derive(Debug)]
pub struct PcmChunker {
    target_rate: u32,
    chunk_samples: usize,
    resampler: Option<LinearResampler>,
    pending: Vec<i16>,
}

impl PcmChunker {
    pub fn new(target_rate: u32, chunk: Duration) -> Self {
        let chunk_samples =
            ((target_rate as u128 * chunk.as_millis()) / 1000).max(1) as usize;
        Self {
            target_rate,
            chunk_samples,
            resampler: None,
            pending: Vec::with_capacity(chunk_samples),
        }
    }

    pub fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }

    /// Feed one frame and return every completed chunk.
    pub fn push(&mut self, frame: &InputFrame) -> Vec<AudioChunk> {
        if frame.sample_rate == 0 || frame.channels == 0 {
            tracing::warn!(
                rate = frame.sample_rate,
                channels = frame.channels,
                "Dropping capture frame with invalid format"
            );
            return Vec::new();
        }
        let mono = downmix(&frame.samples, frame.channels);

        if self
            .resampler
            .as_ref()
            .is_none_or(|r| r.from_rate() != frame.sample_rate)
        {
            tracing::debug!(
                from = frame.sample_rate,
                to = self.target_rate,
                "Capture resampler configured"
            );
            self.resampler = Some(LinearResampler::new(frame.sample_rate, self.target_rate));
        }

        let resampled = match &mut self.resampler {
            Some(resampler) => resampler.process(&mono),
            None => mono,
        };
        self.pending.extend(resampled.into_iter().map(f32_to_i16));

        let mut chunks = Vec::new();
        while self.pending.len() >= self.chunk_samples {
            let rest = self.pending.split_off(self.chunk_samples);
            let samples = std::mem::replace(&mut self.pending, rest);
            chunks.push(AudioChunk::new(
                samples,
                self.target_rate,
                StreamDirection::Outbound,
            ));
        }
        chunks
    }

    /// Emit the partial chunk, if any.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.pending);
        Some(AudioChunk::new(
            samples,
            self.target_rate,
            StreamDirection::Outbound,
        ))
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(r) = &mut self.resampler {
            r.reset();
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Capture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub chunk: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: INPUT_SAMPLE_RATE,
            chunk: Duration::from_millis(DEFAULT_CHUNK_MS),
        }
    }
}

/// Drives a [`MicrophoneSource`] into a [`ChunkSink`] while enabled.
pub struct CapturePipeline {
    source: Arc<dyn MicrophoneSource>,
    sink: Arc<dyn ChunkSink>,
    config: CaptureConfig,
    errors: Arc<Topic<DeviceError>>,
    active: Arc<AtomicBool>,
    running: Option<CancellationToken>,
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish()
    }
}

impl CapturePipeline {
    pub fn new(
        source: Arc<dyn MicrophoneSource>,
        sink: Arc<dyn ChunkSink>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            source,
            sink,
            config,
            errors: Arc::new(Topic::new("captureError")),
            active: Arc::new(AtomicBool::new(false)),
            running: None,
        }
    }

    /// Device failures. The pipeline is already off when one is published.
    pub fn errors(&self) -> &Topic<DeviceError> {
        &self.errors
    }

    /// Whether the capture task is alive.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start or stop capture. Must be called within a Tokio runtime.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.start();
        } else {
            self.stop();
        }
    }

    fn start(&mut self) {
        if self.is_active() {
            return;
        }
        // Reap a task that ended on its own.
        self.stop();

        let token = CancellationToken::new();
        self.active.store(true, Ordering::SeqCst);

        tokio::spawn(run_capture(
            self.source.clone(),
            self.sink.clone(),
            self.config,
            self.errors.clone(),
            self.active.clone(),
            token.clone(),
        ));
        self.running = Some(token);
        tracing::info!("Microphone capture started");
    }

    fn stop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
            if self.active.swap(false, Ordering::SeqCst) {
                tracing::info!("Microphone capture stopped");
            }
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_capture(
    source: Arc<dyn MicrophoneSource>,
    sink: Arc<dyn ChunkSink>,
    config: CaptureConfig,
    errors: Arc<Topic<DeviceError>>,
    active: Arc<AtomicBool>,
    token: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!("Microphone acquisition abandoned");
            return;
        }
        result = source.open() => result,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Failed to open microphone: {}", e);
            if !token.is_cancelled() {
                active.store(false, Ordering::SeqCst);
                errors.emit(&e);
            }
            return;
        }
    };

    let mut chunker = PcmChunker::new(config.sample_rate, config.chunk);
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            frame = stream.frames.recv() => match frame {
                Some(Ok(frame)) => {
                    for chunk in chunker.push(&frame) {
                        if sink.is_open() {
                            sink.send_audio(&chunk);
                            sent += 1;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::error!("Microphone failed: {}", e);
                    if !token.is_cancelled() {
                        active.store(false, Ordering::SeqCst);
                        errors.emit(&e);
                    }
                    break;
                }
                None => {
                    if let Some(chunk) = chunker.flush()
                        && sink.is_open()
                    {
                        sink.send_audio(&chunk);
                        sent += 1;
                    }
                    tracing::info!("Microphone stream ended");
                    if !token.is_cancelled() {
                        active.store(false, Ordering::SeqCst);
                    }
                    break;
                }
            }
        }
    }

    tracing::debug!(chunks = sent, "Capture task finished");
}
