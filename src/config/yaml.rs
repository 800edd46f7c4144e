use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{ConfigError, ConfigResult};

/// Complete YAML configuration structure
///
/// Every field is optional so a file may configure only what it needs.
/// Values present here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// session:
///   api_key: "your-gemini-key"
///   endpoint: "wss://generativelanguage.googleapis.com/ws/..."
///   model: "gemini-2.0-flash-live-001"
///   voice: "Kore"
///   setup_timeout_ms: 15000
///
/// prompt:
///   template: "prompts/interviewer.txt"   # file path or inline text
///   variables:
///     fullName: "Ada Lovelace"
///     jobExperience: "5 years of Rust"
///
/// tools:
///   enabled: ["provide_interview_summary", "take_snapshot"]
///   disabled: ["take_snapshot"]
///
/// turn_taking:
///   long_speech_secs: 30
///   silence_prompt_secs: 10
///   silence_disconnect_secs: 30
///
/// audio:
///   capture_chunk_ms: 40
///   playback_tick_ms: 20
///   playback_schedule_ahead_ms: 200
///   playback_drain_grace_ms: 300
///
/// camera:
///   enabled: true
///   frame_interval_ms: 2000
///   image_path: "candidate.jpg"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub session: Option<SessionYaml>,
    pub prompt: Option<PromptYaml>,
    pub tools: Option<ToolsYaml>,
    pub turn_taking: Option<TurnTakingYaml>,
    pub audio: Option<AudioYaml>,
    pub camera: Option<CameraYaml>,
}

/// Session endpoint settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub setup_timeout_ms: Option<u64>,
}

/// System prompt settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PromptYaml {
    /// Template file path or inline template text
    pub template: Option<String>,
    /// Values for `{{key}}` placeholders, merged over the existing ones
    pub variables: BTreeMap<String, String>,
}

/// Tool selection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsYaml {
    /// When present, only these tools are offered
    pub enabled: Option<Vec<String>>,
    /// Tools to withhold, applied after `enabled`
    pub disabled: Vec<String>,
}

/// Turn-taking thresholds from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TurnTakingYaml {
    pub long_speech_secs: Option<u64>,
    pub silence_prompt_secs: Option<u64>,
    pub silence_disconnect_secs: Option<u64>,
}

/// Audio pipeline timing from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub capture_chunk_ms: Option<u64>,
    pub playback_tick_ms: Option<u64>,
    pub playback_schedule_ahead_ms: Option<u64>,
    pub playback_drain_grace_ms: Option<u64>,
}

/// Camera settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CameraYaml {
    pub enabled: Option<bool>,
    pub frame_interval_ms: Option<u64>,
    pub image_path: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not valid YAML for this structure.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> ConfigResult<Self> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(format!("YAML config: {e}")))
    }
}
