use std::time::Duration;

/// Failures while answering a tool call. These never cross the dispatcher
/// boundary as errors; the dispatcher folds them into the structured
/// `{"error": ...}` payload the service receives.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("telemetry provider is not connected")]
    NotConnected,

    #[error("telemetry read failed: {0}")]
    Read(String),

    #[error("telemetry query timed out after {0:?}")]
    Timeout(Duration),
}
