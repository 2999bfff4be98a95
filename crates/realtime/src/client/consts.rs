use std::time::Duration;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

pub const BASE_URL: &str = "wss://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const OPENAI_BETA_HEADER: &str = "OpenAI-Beta";
pub const OPENAI_BETA_VALUE: &str = "realtime=v1";

/// Handshake bound. A service that has not accepted the socket by now is
/// treated as unreachable rather than waited on.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
