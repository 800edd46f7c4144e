use serde_json::{Value, json};
use thiserror::Error;

/// Errors raised by local tool handlers.
///
/// A failing handler still answers the remote endpoint: the dispatcher turns
/// the error into an error-shaped result payload via [`ToolDispatchError::to_payload`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolDispatchError {
    /// Arguments were missing or had the wrong type
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler ran but could not complete
    #[error("Tool failed: {0}")]
    Failed(String),
}

impl ToolDispatchError {
    /// Payload sent back to the remote endpoint in place of a result.
    pub fn to_payload(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// Result type for tool handlers.
pub type ToolDispatchResult<T> = Result<T, ToolDispatchError>;
