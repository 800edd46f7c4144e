//! Gemini Live WebSocket message types.
//!
//! All messages are JSON objects keyed by their kind.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - setup - Model, modalities, voice, system instruction, tools
//! - realtimeInput - Base64 media chunks (PCM audio, JPEG frames)
//! - clientContent - User text turns
//! - toolResponse - Results for tool invocations
//!
//! Server messages (received from server):
//! - setupComplete - Setup acknowledged
//! - serverContent - Model turn parts, transcriptions, turn/interrupt flags
//! - toolCall - Function calls requested by the model
//! - toolCallCancellation - Function calls withdrawn by the model
//! - goAway - The server will disconnect soon

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::base::{
    AudioChunk, ImageFrame, SessionConfig, StreamDirection, ToolDeclaration, ToolInvocation,
    ToolResult, Transcription,
};
use super::config::{INPUT_AUDIO_MIME, OUTPUT_SAMPLE_RATE, model_resource_name, sample_rate_from_mime};

// =============================================================================
// Client Messages (sent to server)
// =============================================================================

/// Messages sent to the Live API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message of every session
    Setup(SetupPayload),
    /// Streaming media input
    RealtimeInput(RealtimeInput),
    /// Conversation turns
    ClientContent(ClientContent),
    /// Tool invocation results
    ToolResponse(ToolResponse),
}

/// Session setup payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    /// Model resource name (`models/...`)
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

/// Generation options.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Role-tagged list of parts.
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// One `functionDeclarations` group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolGroup {
    pub function_declarations: Vec<ToolDeclaration>,
}

/// Empty object enabling a transcription stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

/// Base64 encoded media blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<ToolResult>,
}

impl ClientMessage {
    /// Build the setup message for a session configuration.
    pub fn setup(config: &SessionConfig) -> Self {
        let system_instruction = config
            .system_instruction
            .as_ref()
            .filter(|text| !text.is_empty())
            .map(|text| Content {
                role: None,
                parts: vec![TextPart { text: text.clone() }],
            });

        ClientMessage::Setup(SetupPayload {
            model: model_resource_name(&config.model),
            generation_config: GenerationConfig {
                response_modalities: config
                    .response_modalities
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
                speech_config: config.voice.as_ref().map(|voice| SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.clone(),
                        },
                    },
                }),
            },
            system_instruction,
            // One group per declaration, as the Live console does.
            tools: config
                .tools
                .iter()
                .map(|decl| ToolGroup {
                    function_declarations: vec![decl.clone()],
                })
                .collect(),
            input_audio_transcription: config
                .input_transcription
                .then(TranscriptionConfig::default),
            output_audio_transcription: config
                .output_transcription
                .then(TranscriptionConfig::default),
        })
    }

    /// Wrap an outbound PCM chunk.
    pub fn audio(chunk: &AudioChunk) -> Self {
        let mime_type = if chunk.sample_rate == 16000 {
            INPUT_AUDIO_MIME.to_string()
        } else {
            format!("audio/pcm;rate={}", chunk.sample_rate)
        };
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type,
                data: BASE64_STANDARD.encode(chunk.to_le_bytes()),
            }],
        })
    }

    /// Wrap an encoded image frame.
    pub fn image(frame: &ImageFrame) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: frame.mime_type.clone(),
                data: BASE64_STANDARD.encode(&frame.data),
            }],
        })
    }

    /// A complete user text turn.
    pub fn text(text: &str) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content {
                role: Some("user".to_string()),
                parts: vec![TextPart {
                    text: text.to_string(),
                }],
            }],
            turn_complete: true,
        })
    }

    pub fn tool_response(results: Vec<ToolResult>) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: results,
        })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Setup(_) => "setup",
            ClientMessage::RealtimeInput(_) => "realtimeInput",
            ClientMessage::ClientContent(_) => "clientContent",
            ClientMessage::ToolResponse(_) => "toolResponse",
        }
    }
}

// =============================================================================
// Server Messages (received from server)
// =============================================================================

/// A raw server message. Exactly one field is normally present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub tool_call: Option<ToolCallPayload>,
    pub tool_call_cancellation: Option<ToolCallCancellationPayload>,
    pub go_away: Option<GoAwayPayload>,
    pub error: Option<ServerErrorPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub turn_complete: bool,
    pub interrupted: bool,
    pub generation_complete: bool,
    pub input_transcription: Option<TranscriptionPayload>,
    pub output_transcription: Option<TranscriptionPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<MediaChunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranscriptionPayload {
    pub text: String,
    pub finished: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallPayload {
    pub function_calls: Vec<ToolInvocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolCallCancellationPayload {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoAwayPayload {
    pub time_left: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerErrorPayload {
    pub code: Option<i64>,
    pub message: String,
}

/// Typed event derived from a server message, in the order it must be relayed.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SetupComplete,
    ToolCall(Vec<ToolInvocation>),
    ToolCallCancellation(Vec<String>),
    Interrupted,
    InputTranscription(Transcription),
    OutputTranscription(Transcription),
    Audio(AudioChunk),
    Content(String),
    TurnComplete,
    GoAway(Option<String>),
    Error(String),
}

impl ServerMessage {
    /// Parse a JSON frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Flatten the message into relayable events.
    ///
    /// `interrupted` short-circuits the rest of the server content: parts that
    /// arrive with an interruption belong to the utterance being discarded.
    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if let Some(err) = self.error {
            let message = match err.code {
                Some(code) => format!("{} (code {code})", err.message),
                None => err.message,
            };
            events.push(ServerEvent::Error(message));
        }

        if let Some(call) = self.tool_call {
            events.push(ServerEvent::ToolCall(call.function_calls));
        }

        if let Some(cancel) = self.tool_call_cancellation {
            events.push(ServerEvent::ToolCallCancellation(cancel.ids));
        }

        if self.setup_complete.is_some() {
            events.push(ServerEvent::SetupComplete);
        }

        if let Some(go_away) = self.go_away {
            events.push(ServerEvent::GoAway(go_away.time_left));
        }

        let Some(content) = self.server_content else {
            return events;
        };

        if content.interrupted {
            events.push(ServerEvent::Interrupted);
            return events;
        }

        if let Some(t) = content.input_transcription {
            events.push(ServerEvent::InputTranscription(Transcription {
                text: t.text,
                is_final: t.finished.unwrap_or(false),
            }));
        }

        if let Some(t) = content.output_transcription {
            events.push(ServerEvent::OutputTranscription(Transcription {
                text: t.text,
                is_final: t.finished.unwrap_or(false),
            }));
        }

        if let Some(turn) = content.model_turn {
            let mut texts = Vec::new();
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    if blob.mime_type.starts_with("audio/pcm") {
                        match BASE64_STANDARD.decode(blob.data.as_bytes()) {
                            Ok(bytes) => {
                                let rate = sample_rate_from_mime(&blob.mime_type)
                                    .unwrap_or(OUTPUT_SAMPLE_RATE);
                                events.push(ServerEvent::Audio(AudioChunk::from_le_bytes(
                                    &bytes,
                                    rate,
                                    StreamDirection::Inbound,
                                )));
                            }
                            Err(e) => {
                                tracing::error!("Failed to decode inline audio: {}", e);
                            }
                        }
                    } else {
                        tracing::debug!("Ignoring inline data of type {}", blob.mime_type);
                    }
                }
                if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                    texts.push(text);
                }
            }
            if !texts.is_empty() {
                events.push(ServerEvent::Content(texts.join(" ")));
            }
        }

        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }

        events
    }
}

// =============================================================================
// Tests
// =============================================================================
