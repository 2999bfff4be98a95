//! Application configuration.
//!
//! Everything is loaded from the environment once at startup and passed into
//! the controller; nothing is mutable mid-session.

use std::env;
use std::time::Duration;

use tracing::Level;

// --- Application constants ---

/// The size of each audio chunk read from the microphone input stream.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// The size of each audio chunk for the audio output stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// The latency for the output audio buffer in milliseconds.
pub const OUTPUT_LATENCY_MS: usize = 1000;
/// Capture frames buffered between the hardware callback and the send loop.
pub const CAPTURE_QUEUE_FRAMES: usize = 256;
/// The send loop wakes at least this often to notice a shutdown request.
pub const CAPTURE_RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub realtime_model: String,
    pub telemetry_server_url: Option<String>,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `OPENAI_API_KEY`: Secret key for the Realtime API. Required.
    /// *   `REALTIME_MODEL`: (Optional) Model override.
    /// *   `TELEMETRY_SERVER_URL`: (Optional) Racing data server address.
    /// *   `RUST_LOG`: (Optional) Logging level, defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env if present; useful for local development.
        dotenvy::dotenv().ok();

        let openai_api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let realtime_model = env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-12-17".to_string());

        let telemetry_server_url = env::var("TELEMETRY_SERVER_URL").ok();

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            openai_api_key,
            realtime_model,
            telemetry_server_url,
            log_level,
        })
    }
}
