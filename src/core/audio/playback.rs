//! Gapless playback scheduling for inbound agent audio.
//!
//! The scheduler keeps a cursor at the end of the last scheduled chunk. Each
//! new chunk starts at `max(cursor, now)`: back-to-back chunks play without a
//! gap, and a chunk that arrives after an underrun starts from "now" instead
//! of overlapping or being squeezed into the past.
//!
//! Chunks are handed to an [`AudioOutput`] shortly before they are due
//! (`schedule_ahead`). [`PlaybackScheduler::interrupt`] drops everything that
//! has not finished and halts the output, which is the barge-in path.
//!
//! Completion of an utterance is debounced by `drain_grace`: the queue must
//! stay empty that long past the cursor before [`PlaybackScheduler::pump`]
//! reports the drain, so short underruns inside one utterance are ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::core::session::AudioChunk;
use crate::errors::DeviceError;

/// Sink that renders scheduled audio.
pub trait AudioOutput: Send + Sync {
    /// Render `chunk` starting at `start_at`. May be called ahead of time.
    fn play(&self, start_at: Instant, chunk: &AudioChunk) -> Result<(), DeviceError>;

    /// Stop all audio handed over so far.
    fn halt(&self);
}

/// Output that discards audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn play(&self, _start_at: Instant, _chunk: &AudioChunk) -> Result<(), DeviceError> {
        Ok(())
    }

    fn halt(&self) {}
}

/// Scheduler timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// How far ahead of its start time a chunk is submitted
    pub schedule_ahead: Duration,
    /// Quiet time after the cursor before an utterance counts as finished
    pub drain_grace: Duration,
    /// Interval at which the owner should call `pump`
    pub tick: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            schedule_ahead: Duration::from_millis(200),
            drain_grace: Duration::from_millis(300),
            tick: Duration::from_millis(20),
        }
    }
}

#[derive(Debug)]
struct ScheduledChunk {
    start: Instant,
    end: Instant,
    chunk: AudioChunk,
    submitted: bool,
}

/// Schedules inbound chunks onto an [`AudioOutput`].
pub struct PlaybackScheduler {
    output: Arc<dyn AudioOutput>,
    config: PlaybackConfig,
    queue: VecDeque<ScheduledChunk>,
    cursor: Option<Instant>,
    utterance_active: bool,
    volume: watch::Sender<f32>,
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("config", &self.config)
            .field("queued", &self.queue.len())
            .field("cursor", &self.cursor)
            .field("utterance_active", &self.utterance_active)
            .finish()
    }
}

impl PlaybackScheduler {
    pub fn new(output: Arc<dyn AudioOutput>, config: PlaybackConfig) -> Self {
        let (volume, _) = watch::channel(0.0);
        Self {
            output,
            config,
            queue: VecDeque::new(),
            cursor: None,
            utterance_active: false,
            volume,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Live output level of the chunk currently playing.
    pub fn volume(&self) -> watch::Receiver<f32> {
        self.volume.subscribe()
    }

    /// Chunks scheduled and not yet finished.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// End of the last scheduled chunk.
    pub fn cursor(&self) -> Option<Instant> {
        self.cursor
    }

    /// Whether an utterance is playing or waiting to be reported as drained.
    pub fn is_active(&self) -> bool {
        self.utterance_active
    }

    /// Schedule a chunk and return its start time.
    pub fn enqueue(&mut self, chunk: AudioChunk, now: Instant) -> Instant {
        let start = match self.cursor {
            Some(cursor) if cursor > now => cursor,
            _ => now,
        };
        if chunk.is_empty() {
            return start;
        }

        let end = start + chunk.duration();
        self.cursor = Some(end);
        self.utterance_active = true;
        self.queue.push_back(ScheduledChunk {
            start,
            end,
            chunk,
            submitted: false,
        });
        tracing::trace!(queued = self.queue.len(), "Scheduled agent audio");

        self.submit_due(now);
        start
    }

    /// Advance the schedule to `now`.
    ///
    /// Returns `true` exactly once per utterance, when its audio has drained.
    pub fn pump(&mut self, now: Instant) -> bool {
        while self.queue.front().is_some_and(|c| c.end <= now) {
            self.queue.pop_front();
        }

        self.submit_due(now);

        let level = self
            .queue
            .iter()
            .find(|c| c.start <= now && now < c.end)
            .map(|c| c.chunk.rms())
            .unwrap_or(0.0);
        self.publish_volume(level);

        if self.utterance_active && self.queue.is_empty() {
            let drained = self
                .cursor
                .is_none_or(|cursor| now >= cursor + self.config.drain_grace);
            if drained {
                self.utterance_active = false;
                tracing::debug!("Agent audio drained");
                return true;
            }
        }
        false
    }

    /// Barge-in: drop all unfinished audio and reset the cursor.
    ///
    /// Returns the number of chunks flushed. The interrupted utterance is
    /// never reported as drained.
    pub fn interrupt(&mut self, _now: Instant) -> usize {
        let flushed = self.queue.len();
        self.queue.clear();
        self.cursor = None;
        self.utterance_active = false;
        self.output.halt();
        self.publish_volume(0.0);
        if flushed > 0 {
            tracing::debug!(flushed, "Flushed agent audio");
        }
        flushed
    }

    /// Discard everything without halting a device that may be gone already.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.cursor = None;
        self.utterance_active = false;
        self.publish_volume(0.0);
    }

    fn submit_due(&mut self, now: Instant) {
        let horizon = now + self.config.schedule_ahead;
        for scheduled in self.queue.iter_mut() {
            if scheduled.start > horizon {
                break;
            }
            if scheduled.submitted {
                continue;
            }
            scheduled.submitted = true;
            if let Err(e) = self.output.play(scheduled.start, &scheduled.chunk) {
                tracing::warn!("Audio output rejected chunk: {}", e);
            }
        }
    }

    fn publish_volume(&self, level: f32) {
        self.volume.send_if_modified(|current| {
            if (*current - level).abs() > f32::EPSILON {
                *current = level;
                true
            } else {
                false
            }
        });
    }
}
