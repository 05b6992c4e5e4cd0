use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised while dispatching a tool call to a system
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

impl ToolError {
    /// The human readable reason recorded on a failed tool part.
    ///
    /// Execution failures carry the collaborator's own message verbatim, the
    /// other variants are rendered with their display prefix.
    pub fn reason(&self) -> String {
        match self {
            ToolError::ExecutionError(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Inconsistencies between a terminal notification and the tracked tool calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Unknown tool call: {0}")]
    UnknownCall(String),

    #[error("Tool call already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("Tool call already registered: {0}")]
    DuplicateCall(String),
}

/// Stream events the reducer refuses to apply. None of these are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream already finished")]
    Finished,

    #[error("Turn already completed: {0}")]
    TurnCompleted(String),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Failures talking to the geocoding service
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Nominatim API error: {0}")]
    Status(u16),

    #[error("Nominatim request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Could not decode Nominatim response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_reason_is_verbatim() {
        let error = ToolError::ExecutionError("Nominatim API error: 503".to_string());
        assert_eq!(error.reason(), "Nominatim API error: 503");
    }

    #[test]
    fn test_other_reasons_keep_prefix() {
        let error = ToolError::ToolNotFound("geocode__reverse".to_string());
        assert_eq!(error.reason(), "Tool not found: geocode__reverse");
    }

    #[test]
    fn test_gateway_status_message() {
        assert_eq!(
            GatewayError::Status(503).to_string(),
            "Nominatim API error: 503"
        );
    }
}
