use thiserror::Error;

/// Errors raised while loading or validating [`LiveConfig`](crate::config::LiveConfig).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration or template file could not be read
    #[error("Failed to read config file {0}")]
    Io(String),

    /// Malformed YAML or an unparsable environment value
    #[error("Failed to parse {0}")]
    Parse(String),

    /// A value is present but not acceptable
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A required value is absent
    #[error("Missing configuration: {0}")]
    Missing(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
