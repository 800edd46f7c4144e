//! Live conversation session.
//!
//! This module provides the WebSocket client for the Gemini Live
//! `BidiGenerateContent` API together with its event bus and wire types.
//!
//! # Architecture
//!
//! - [`LiveClient`] drives the `idle -> connecting -> open -> closing -> closed`
//!   lifecycle and owns the socket I/O task
//! - [`SessionEvents`] exposes one typed [`Topic`] per event
//! - [`messages`] holds the serde representation of the protocol
//!
//! # Audio Format
//!
//! - Outbound: PCM 16-bit little-endian at 16kHz mono
//! - Inbound: PCM 16-bit little-endian at 24kHz mono

mod base;
mod client;
pub mod config;
mod events;
pub mod messages;

pub use base::{
    AudioChunk, CloseEvent, ImageFrame, LifecycleState, Modality, SessionConfig, SessionError,
    SessionResult, StreamDirection, ToolDeclaration, ToolInvocation, ToolResult, Transcription,
};
pub use client::LiveClient;
pub use config::{
    DEFAULT_LIVE_MODEL, DEFAULT_SETUP_TIMEOUT_MS, GEMINI_LIVE_URL, INPUT_AUDIO_MIME,
    INPUT_SAMPLE_RATE, LiveVoice, OUTPUT_SAMPLE_RATE,
};
pub use events::{EventCallback, SessionEvents, SubscriptionId, Topic};
