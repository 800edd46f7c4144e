//! Configuration module for WaaV Live
//!
//! This module loads the session configuration from various sources: .env
//! files, YAML files and environment variables. Priority: YAML > ENV vars >
//! .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging defaults, environment and YAML
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use waav_live::config::LiveConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = LiveConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = LiveConfig::from_file(Path::new("live.yaml"))?;
//! println!("Model: {}", config.model);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::audio::{CaptureConfig, PlaybackConfig};
use crate::core::prompt::{PromptTemplate, PromptVariables};
use crate::core::session::{
    DEFAULT_LIVE_MODEL, DEFAULT_SETUP_TIMEOUT_MS, GEMINI_LIVE_URL, INPUT_SAMPLE_RATE, LiveVoice,
    Modality, SessionConfig,
};
use crate::core::tools::{ToolRegistry, interviewer_registry};
use crate::core::turn_taking::TurnTakingPolicy;
use crate::errors::{ConfigError, ConfigResult};

/// System prompt source and placeholder values.
#[derive(Debug, Clone, Default)]
pub struct PromptConfig {
    /// File path or inline template; `None` selects the built-in interviewer
    pub template: Option<String>,
    pub variables: PromptVariables,
}

/// Which registered tools are offered to the agent.
#[derive(Debug, Clone, Default)]
pub struct ToolSelection {
    /// When set, only these tools stay enabled
    pub enabled: Option<Vec<String>>,
    /// Tools disabled after `enabled` is applied
    pub disabled: Vec<String>,
}

/// Capture and playback timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSettings {
    pub capture_chunk_ms: u64,
    pub playback_tick_ms: u64,
    pub playback_schedule_ahead_ms: u64,
    pub playback_drain_grace_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        let playback = PlaybackConfig::default();
        Self {
            capture_chunk_ms: CaptureConfig::default().chunk.as_millis() as u64,
            playback_tick_ms: playback.tick.as_millis() as u64,
            playback_schedule_ahead_ms: playback.schedule_ahead.as_millis() as u64,
            playback_drain_grace_ms: playback.drain_grace.as_millis() as u64,
        }
    }
}

/// Camera pump settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    /// Turn the camera on when a session opens
    pub enabled: bool,
    pub frame_interval_ms: u64,
    /// Still image served as the camera feed
    pub image_path: Option<PathBuf>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_interval_ms: 2000,
            image_path: None,
        }
    }
}

/// Live session configuration
///
/// Everything the console needs to build a [`SessionConfig`], its tool
/// registry, the turn-taking policy and the media pipelines.
#[derive(Clone)]
pub struct LiveConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub voice: LiveVoice,
    pub setup_timeout_ms: u64,
    pub prompt: PromptConfig,
    pub tools: ToolSelection,
    pub turn_taking: TurnTakingPolicy,
    pub audio: AudioSettings,
    pub camera: CameraSettings,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: GEMINI_LIVE_URL.to_string(),
            model: DEFAULT_LIVE_MODEL.to_string(),
            voice: LiveVoice::default(),
            setup_timeout_ms: DEFAULT_SETUP_TIMEOUT_MS,
            prompt: PromptConfig::default(),
            tools: ToolSelection::default(),
            turn_taking: TurnTakingPolicy::default(),
            audio: AudioSettings::default(),
            camera: CameraSettings::default(),
        }
    }
}

impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("setup_timeout_ms", &self.setup_timeout_ms)
            .field("prompt", &self.prompt)
            .field("tools", &self.tools)
            .field("turn_taking", &self.turn_taking)
            .field("audio", &self.audio)
            .field("camera", &self.camera)
            .finish()
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for LiveConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl LiveConfig {
    /// Load from environment variables and validate.
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self::load(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file layered over environment variables and validate.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// value is malformed, or validation fails.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let config = Self::load(Some(path))?;
        config.validate()?;
        Ok(config)
    }

    /// Merge all layers and validate everything except the API key.
    ///
    /// Used by commands that never connect.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let yaml = path.map(YamlConfig::from_file).transpose()?;
        let config = merge::merge_config(yaml)?;

        validation::validate_endpoint(&config.endpoint)?;
        validation::validate_timings(&config)?;

        Ok(config)
    }

    /// Full validation, including the API key.
    pub fn validate(&self) -> ConfigResult<()> {
        validation::validate_api_key(&self.api_key)?;
        validation::validate_endpoint(&self.endpoint)?;
        validation::validate_timings(self)
    }

    pub fn prompt_template(&self) -> ConfigResult<PromptTemplate> {
        match &self.prompt.template {
            Some(location) => PromptTemplate::load(location)
                .map_err(|e| ConfigError::Io(format!("prompt template {location}: {e}"))),
            None => Ok(PromptTemplate::interviewer()),
        }
    }

    /// Rendered system instruction for the given camera state.
    pub fn system_instruction(&self, camera_on: bool) -> ConfigResult<String> {
        Ok(self
            .prompt_template()?
            .render(&self.prompt.variables, camera_on))
    }

    /// Interviewer tools with the configured selection applied.
    pub fn tool_registry(&self) -> ToolRegistry {
        let mut registry = interviewer_registry();

        if let Some(enabled) = &self.tools.enabled {
            for name in enabled {
                if registry.get(name).is_none() {
                    tracing::warn!(tool = %name, "Enabled tool is not registered");
                }
            }
            let names: Vec<String> = registry
                .entries()
                .iter()
                .map(|e| e.declaration.name.clone())
                .collect();
            for name in names {
                registry.set_enabled(&name, enabled.contains(&name));
            }
        }

        for name in &self.tools.disabled {
            if !registry.set_enabled(name, false) {
                tracing::warn!(tool = %name, "Disabled tool is not registered");
            }
        }

        registry
    }

    /// Connection bundle for [`LiveClient::connect`](crate::core::session::LiveClient::connect).
    pub fn session_config(
        &self,
        tools: &ToolRegistry,
        camera_on: bool,
    ) -> ConfigResult<SessionConfig> {
        Ok(SessionConfig {
            api_key: self.api_key.clone().unwrap_or_default(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            response_modalities: vec![Modality::Audio],
            voice: Some(self.voice.as_str().to_string()),
            system_instruction: Some(self.system_instruction(camera_on)?),
            tools: tools.enabled_declarations(),
            input_transcription: true,
            output_transcription: true,
            setup_timeout_ms: self.setup_timeout_ms,
        })
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: INPUT_SAMPLE_RATE,
            chunk: Duration::from_millis(self.audio.capture_chunk_ms),
        }
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            schedule_ahead: Duration::from_millis(self.audio.playback_schedule_ahead_ms),
            drain_grace: Duration::from_millis(self.audio.playback_drain_grace_ms),
            tick: Duration::from_millis(self.audio.playback_tick_ms),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.camera.frame_interval_ms)
    }
}
