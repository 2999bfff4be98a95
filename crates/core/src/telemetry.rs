//! Contract for the live data source behind the coach's tool calls.
//!
//! The simulator connection can drop at any moment, so every getter has a
//! documented default-valued mapping it returns when no live session exists.
//! "No data" and "real zeroed data" look the same at the type level; callers
//! that care check `is_connected` separately.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::{json, Value};

use crate::error::ToolError;

/// A flat key/value snapshot document. Each of the three documents is
/// fetched independently and may reflect a slightly different instant.
pub type TelemetryMap = serde_json::Map<String, Value>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Attempt to reach the live telemetry source. Returns whether a live
    /// session is available; failure is not an error, the provider keeps
    /// serving defaults.
    async fn connect(&mut self) -> bool;

    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Race position, lap, nearby competitors.
    async fn get_racing_situation(&self) -> Result<TelemetryMap, ToolError>;

    /// Vehicle state: speed, RPM, gear, pedals, temperatures.
    async fn get_telemetry(&self) -> Result<TelemetryMap, ToolError>;

    /// Track name, layout and conditions.
    async fn get_track_info(&self) -> Result<TelemetryMap, ToolError>;

    fn list_available_tools(&self) -> Vec<String>;
}

/// Default documents served when no live session exists.
pub mod defaults {
    use super::*;

    pub fn racing_situation() -> TelemetryMap {
        as_map(json!({
            "position": "unknown",
            "lap": "unknown",
            "speed": "unknown",
            "track_conditions": "unknown",
            "vehicle_status": "unknown",
            "competitors": []
        }))
    }

    pub fn telemetry() -> TelemetryMap {
        as_map(json!({
            "rpm": 0,
            "gear": 0,
            "throttle": 0.0,
            "brake": 0.0,
            "steering": 0.0,
            "temperatures": {}
        }))
    }

    pub fn track_info() -> TelemetryMap {
        as_map(json!({
            "name": "unknown",
            "length": "unknown",
            "layout": "unknown",
            "surface": "unknown",
            "weather": "unknown"
        }))
    }

    fn as_map(value: Value) -> TelemetryMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("defaults are object literals"),
        }
    }
}

/// Client for the racing data server. The transport to the actual simulator
/// box is not wired up yet; until it is, `connect` reports no live session
/// and every getter serves its default document, which keeps the rest of the
/// stack exercising the real code paths.
pub struct RacingDataClient {
    server_url: String,
    connected: bool,
}

impl RacingDataClient {
    pub const DEFAULT_SERVER_URL: &'static str = "http://localhost:3000";

    pub fn new(server_url: Option<String>) -> Self {
        Self {
            server_url: server_url.unwrap_or_else(|| Self::DEFAULT_SERVER_URL.to_string()),
            connected: false,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[async_trait]
impl TelemetryProvider for RacingDataClient {
    async fn connect(&mut self) -> bool {
        tracing::info!(
            "racing data server at {} is not wired up yet; serving default telemetry",
            self.server_url
        );
        self.connected = false;
        self.connected
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn get_racing_situation(&self) -> Result<TelemetryMap, ToolError> {
        Ok(defaults::racing_situation())
    }

    async fn get_telemetry(&self) -> Result<TelemetryMap, ToolError> {
        Ok(defaults::telemetry())
    }

    async fn get_track_info(&self) -> Result<TelemetryMap, ToolError> {
        Ok(defaults::track_info())
    }

    fn list_available_tools(&self) -> Vec<String> {
        crate::dispatcher::ToolName::ALL
            .iter()
            .map(|name| name.as_str().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_client_still_serves_defaults() {
        let mut client = RacingDataClient::new(None);
        assert!(!client.connect().await);
        assert!(!client.is_connected());

        let situation = client.get_racing_situation().await.unwrap();
        assert_eq!(situation["position"], "unknown");
        assert_eq!(situation["competitors"], json!([]));

        let telemetry = client.get_telemetry().await.unwrap();
        assert_eq!(telemetry["rpm"], 0);
        assert_eq!(telemetry["throttle"], 0.0);

        let track = client.get_track_info().await.unwrap();
        assert_eq!(track["name"], "unknown");
    }

    #[tokio::test]
    async fn test_lists_the_fixed_tool_set() {
        let client = RacingDataClient::new(Some("http://sim-box:3000".to_string()));
        assert_eq!(
            client.list_available_tools(),
            vec!["get_telemetry", "get_racing_situation", "get_track_info"]
        );
        assert_eq!(client.server_url(), "http://sim-box:3000");
    }
}
