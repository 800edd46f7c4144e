//! Base types for the live conversation session.
//!
//! This module defines the error taxonomy, the connection lifecycle and the
//! payload types carried by session events.
//!
//! # Audio Format
//!
//! Outbound audio is PCM 16-bit signed little-endian, 16kHz mono.
//! Inbound audio is PCM 16-bit at the rate announced by the endpoint
//! (24kHz mono for Gemini Live).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::config::{DEFAULT_SETUP_TIMEOUT_MS, GEMINI_LIVE_URL};
use crate::core::audio::pcm;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The configuration is not usable yet (e.g. no response modality)
    #[error("Configuration incomplete: {0}")]
    ConfigIncomplete(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Connection to the endpoint failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Network or socket failure on an established session
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error reported by the remote endpoint
    #[error("Provider error: {0}")]
    Provider(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The attempt was abandoned because the session was torn down
    #[error("Aborted: {0}")]
    Aborted(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Response modality requested from the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Synthesized speech
    Audio,
    /// Plain text
    Text,
}

impl Modality {
    /// Wire representation of the modality.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Audio => "AUDIO",
            Modality::Text => "TEXT",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A function the remote agent may invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Per-connection configuration bundle.
///
/// Immutable once handed to [`LiveClient::connect`](super::LiveClient::connect).
/// The default value has no response modality, which models a configuration
/// that has not been populated yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// API key for authentication
    pub api_key: String,

    /// WebSocket endpoint (without query string)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model to use (with or without the `models/` prefix)
    #[serde(default)]
    pub model: String,

    /// Response modalities; must not be empty when connecting
    #[serde(default)]
    pub response_modalities: Vec<Modality>,

    /// Prebuilt voice name for audio responses
    #[serde(default)]
    pub voice: Option<String>,

    /// System instruction text
    #[serde(default)]
    pub system_instruction: Option<String>,

    /// Enabled tool declarations
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,

    /// Request transcripts of the user's speech
    #[serde(default = "default_true")]
    pub input_transcription: bool,

    /// Request transcripts of the agent's speech
    #[serde(default = "default_true")]
    pub output_transcription: bool,

    /// How long to wait for `setupComplete`
    #[serde(default = "default_setup_timeout_ms")]
    pub setup_timeout_ms: u64,
}

fn default_endpoint() -> String {
    GEMINI_LIVE_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_setup_timeout_ms() -> u64 {
    DEFAULT_SETUP_TIMEOUT_MS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_endpoint(),
            model: String::new(),
            response_modalities: Vec::new(),
            voice: None,
            system_instruction: None,
            tools: Vec::new(),
            input_transcription: true,
            output_transcription: true,
            setup_timeout_ms: DEFAULT_SETUP_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Audio-response configuration with the default endpoint.
    pub fn audio(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            response_modalities: vec![Modality::Audio],
            ..Default::default()
        }
    }

    /// Check that a connection attempt is permitted.
    pub fn ensure_complete(&self) -> SessionResult<()> {
        if self.response_modalities.is_empty() {
            return Err(SessionError::ConfigIncomplete(
                "response modalities are empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Handshake timeout as a [`Duration`].
    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle of a session.
///
/// `idle -> connecting -> open -> closing -> closed`; any state may fall to
/// `closed` on a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No connection has been attempted yet
    #[default]
    Idle,
    /// Handshake in progress
    Connecting,
    /// Setup acknowledged; traffic flows
    Open,
    /// Local teardown in progress
    Closing,
    /// Torn down
    Closed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Open => "open",
            LifecycleState::Closing => "closing",
            LifecycleState::Closed => "closed",
        }
    }

    /// Whether a teardown has anything to tear down.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LifecycleState::Connecting | LifecycleState::Open | LifecycleState::Closing
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Event Payloads
// =============================================================================

/// Direction of an audio stream relative to this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Microphone audio going to the endpoint
    Outbound,
    /// Agent audio coming from the endpoint
    Inbound,
}

/// A contiguous buffer of 16-bit linear PCM, mono.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// PCM samples
    pub samples: Arc<[i16]>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Logical stream direction
    pub direction: StreamDirection,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32, direction: StreamDirection) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            direction,
        }
    }

    /// Decode little-endian PCM16 bytes. A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32, direction: StreamDirection) -> Self {
        Self::new(pcm::bytes_to_samples(bytes), sample_rate, direction)
    }

    /// Encode as little-endian PCM16 bytes.
    pub fn to_le_bytes(&self) -> Bytes {
        Bytes::from(pcm::samples_to_bytes(&self.samples))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of the chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Root-mean-square level in `0.0..=1.0`.
    pub fn rms(&self) -> f32 {
        pcm::rms(&self.samples)
    }
}

/// An encoded still image (camera frame, snapshot or cue).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    /// MIME type, e.g. `image/jpeg`
    pub mime_type: String,
    /// Encoded image bytes
    pub data: Bytes,
}

impl ImageFrame {
    pub fn jpeg(data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data: data.into(),
        }
    }
}

/// Incremental speech-to-text update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    /// Text increment
    pub text: String,
    /// Whether the endpoint marked the unit as finished
    pub is_final: bool,
}

/// A structured request from the remote agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation id
    pub id: String,
    /// Function name
    pub name: String,
    /// JSON arguments
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The answer to exactly one [`ToolInvocation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Correlation id copied from the invocation
    pub id: String,
    /// Function name copied from the invocation
    pub name: String,
    /// Result payload
    pub response: serde_json::Value,
}

/// Why a session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// WebSocket close code, when the socket supplied one
    pub code: Option<u16>,
    /// Human readable reason
    pub reason: String,
}

impl CloseEvent {
    pub fn local(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_display() {
        assert_eq!(LifecycleState::Idle.to_string(), "idle");
        assert_eq!(LifecycleState::Open.to_string(), "open");
        assert_eq!(LifecycleState::Closed.to_string(), "closed");
        assert!(LifecycleState::Connecting.is_active());
        assert!(!LifecycleState::Closed.is_active());
        assert!(!LifecycleState::Idle.is_active());
    }

    #[test]
    fn test_default_config_is_incomplete() {
        let config = SessionConfig::default();
        assert!(config.response_modalities.is_empty());
        assert!(matches!(
            config.ensure_complete(),
            Err(SessionError::ConfigIncomplete(_))
        ));

        let config = SessionConfig::audio("key");
        assert!(config.ensure_complete().is_ok());
        assert_eq!(config.endpoint, GEMINI_LIVE_URL);
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"api_key":"k","response_modalities":["AUDIO"]}"#).unwrap();
        assert_eq!(config.response_modalities, vec![Modality::Audio]);
        assert!(config.input_transcription);
        assert!(config.output_transcription);
        assert_eq!(config.setup_timeout_ms, DEFAULT_SETUP_TIMEOUT_MS);
    }

    #[test]
    fn test_audio_chunk_duration() {
        let chunk = AudioChunk::new(vec![0; 2400], 24000, StreamDirection::Inbound);
        assert_eq!(chunk.duration(), Duration::from_millis(100));

        let empty = AudioChunk::new(Vec::new(), 0, StreamDirection::Inbound);
        assert_eq!(empty.duration(), Duration::ZERO);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_audio_chunk_byte_conversion() {
        let chunk = AudioChunk::new(vec![1, -2, i16::MAX], 16000, StreamDirection::Outbound);
        let bytes = chunk.to_le_bytes();
        assert_eq!(bytes.len(), 6);
        let decoded = AudioChunk::from_le_bytes(&bytes, 16000, StreamDirection::Outbound);
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_error_display() {
        let err = SessionError::ConfigIncomplete("no modality".to_string());
        assert!(err.to_string().contains("Configuration incomplete"));
        assert_eq!(SessionError::NotConnected.to_string(), "Not connected");
    }
}
