//! Audio capture and playback.
//!
//! - [`capture`] turns microphone frames into outbound 16kHz PCM16 chunks
//! - [`playback`] schedules inbound agent audio gaplessly and handles barge-in
//! - [`pcm`] holds sample conversion, metering and resampling helpers
//! - [`wav`] provides WAV file backed devices
//! - `device` provides cpal system devices (feature `device-audio`)

pub mod capture;
#[cfg(feature = "device-audio")]
pub mod device;
pub mod pcm;
pub mod playback;
pub mod wav;

pub use capture::{
    CaptureConfig, CapturePipeline, ChunkSink, InputFrame, MicrophoneSource, MicrophoneStream,
    PcmChunker,
};
#[cfg(feature = "device-audio")]
pub use device::{CpalMicrophone, CpalSpeaker};
pub use playback::{AudioOutput, NullOutput, PlaybackConfig, PlaybackScheduler};
pub use wav::{WavClip, WavMicrophone, WavRecorder};
