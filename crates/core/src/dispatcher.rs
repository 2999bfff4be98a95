//! Maps tool-call names from the service onto telemetry queries.
//!
//! Whatever happens here, the service gets a structured reply. An unanswered
//! tool call would stall the whole turn, so unknown names, provider failures
//! and timeouts all fold into an `{"error": ...}` payload instead of
//! propagating.

use std::time::Duration;

use pitwall_realtime_types::tools::{FunctionTool, Tool};
use serde_json::{json, Value};

use crate::telemetry::TelemetryProvider;

pub const UNKNOWN_FUNCTION_ERROR: &str = "Unknown function";

/// Bound on a single telemetry query. The simulator side is shared memory
/// and normally answers in microseconds; anything slower than this means the
/// box is wedged and the turn should continue with an error payload.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    GetTelemetry,
    GetRacingSituation,
    GetTrackInfo,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::GetTelemetry,
        ToolName::GetRacingSituation,
        ToolName::GetTrackInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetTelemetry => "get_telemetry",
            ToolName::GetRacingSituation => "get_racing_situation",
            ToolName::GetTrackInfo => "get_track_info",
        }
    }

    pub fn parse(name: &str) -> Option<ToolName> {
        match name {
            "get_telemetry" => Some(ToolName::GetTelemetry),
            "get_racing_situation" => Some(ToolName::GetRacingSituation),
            "get_track_info" => Some(ToolName::GetTrackInfo),
            _ => None,
        }
    }
}

/// The tool schemas advertised in `session.update`. None of them take
/// arguments; all situational context lives on the provider side.
pub fn declarations() -> Vec<Tool> {
    vec![
        Tool::Function(FunctionTool::no_args(
            ToolName::GetTelemetry.as_str(),
            "Get current vehicle telemetry including speed, RPM, gear, throttle, brake, fuel, and temperatures",
        )),
        Tool::Function(FunctionTool::no_args(
            ToolName::GetRacingSituation.as_str(),
            "Get current race position, lap number, track name, and nearby competitors",
        )),
        Tool::Function(FunctionTool::no_args(
            ToolName::GetTrackInfo.as_str(),
            "Get track conditions including weather, track temperature, and air temperature",
        )),
    ]
}

pub struct ToolDispatcher {
    provider: Box<dyn TelemetryProvider>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(provider: Box<dyn TelemetryProvider>) -> Self {
        Self {
            provider,
            timeout: DISPATCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bring up the provider connection. A `false` here is not fatal; the
    /// provider keeps serving defaults.
    pub async fn connect(&mut self) -> bool {
        self.provider.connect().await
    }

    /// Release the provider connection.
    pub async fn shutdown(&mut self) {
        self.provider.disconnect().await;
    }

    pub fn provider(&self) -> &dyn TelemetryProvider {
        self.provider.as_ref()
    }

    /// Execute one tool call and produce the JSON the service gets back.
    pub async fn dispatch(&self, name: &str) -> Value {
        let Some(tool) = ToolName::parse(name) else {
            tracing::warn!("service requested unknown function {:?}", name);
            return json!({ "error": UNKNOWN_FUNCTION_ERROR });
        };

        let query = async {
            match tool {
                ToolName::GetTelemetry => self.provider.get_telemetry().await,
                ToolName::GetRacingSituation => self.provider.get_racing_situation().await,
                ToolName::GetTrackInfo => self.provider.get_track_info().await,
            }
        };

        match tokio::time::timeout(self.timeout, query).await {
            Ok(Ok(map)) => Value::Object(map),
            Ok(Err(e)) => {
                tracing::warn!("telemetry query {} failed: {}", tool.as_str(), e);
                json!({ "error": e.to_string() })
            }
            Err(_) => {
                let e = crate::error::ToolError::Timeout(self.timeout);
                tracing::warn!("telemetry query {} failed: {}", tool.as_str(), e);
                json!({ "error": e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::telemetry::MockTelemetryProvider;

    fn rpm_map() -> crate::telemetry::TelemetryMap {
        match json!({"rpm": 6000}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_known_tool_returns_provider_mapping() {
        let mut provider = MockTelemetryProvider::new();
        provider
            .expect_get_telemetry()
            .returning(|| Ok(rpm_map()))
            .once();

        let dispatcher = ToolDispatcher::new(Box::new(provider));
        let result = dispatcher.dispatch("get_telemetry").await;
        assert_eq!(result, json!({"rpm": 6000}));
        assert!(result.get("error").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_structured_error() {
        let provider = MockTelemetryProvider::new();
        let dispatcher = ToolDispatcher::new(Box::new(provider));
        let result = dispatcher.dispatch("launch_control").await;
        assert_eq!(result, json!({"error": UNKNOWN_FUNCTION_ERROR}));
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_error_payload() {
        let mut provider = MockTelemetryProvider::new();
        provider
            .expect_get_track_info()
            .returning(|| Err(ToolError::Read("shared memory unmapped".to_string())));

        let dispatcher = ToolDispatcher::new(Box::new(provider));
        let result = dispatcher.dispatch("get_track_info").await;
        assert_eq!(
            result,
            json!({"error": "telemetry read failed: shared memory unmapped"})
        );
    }

    struct WedgedProvider;

    #[async_trait::async_trait]
    impl crate::telemetry::TelemetryProvider for WedgedProvider {
        async fn connect(&mut self) -> bool {
            true
        }

        async fn disconnect(&mut self) {}

        fn is_connected(&self) -> bool {
            true
        }

        async fn get_racing_situation(
            &self,
        ) -> Result<crate::telemetry::TelemetryMap, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(rpm_map())
        }

        async fn get_telemetry(&self) -> Result<crate::telemetry::TelemetryMap, ToolError> {
            Ok(rpm_map())
        }

        async fn get_track_info(&self) -> Result<crate::telemetry::TelemetryMap, ToolError> {
            Ok(rpm_map())
        }

        fn list_available_tools(&self) -> Vec<String> {
            vec![]
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wedged_provider_times_out_into_error_payload() {
        let dispatcher =
            ToolDispatcher::new(Box::new(WedgedProvider)).with_timeout(Duration::from_millis(10));
        let result = dispatcher.dispatch("get_racing_situation").await;
        let message = result["error"].as_str().unwrap();
        assert!(message.contains("timed out"), "got: {}", message);
    }
}
