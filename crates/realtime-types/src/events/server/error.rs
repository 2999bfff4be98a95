#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    code: Option<String>,
    message: String,
    param: Option<String>,
    event_id: Option<String>,
}

impl ErrorDetails {
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn param(&self) -> Option<&str> {
        self.param.as_deref()
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    /// Whether this error leaves the session unusable. Auth failures and an
    /// expired or malformed session cannot be recovered by waiting; anything
    /// else the service reports is scoped to a single turn.
    pub fn is_session_fatal(&self) -> bool {
        if self.error_type == "invalid_session_error" {
            return true;
        }
        matches!(
            self.code.as_deref(),
            Some("invalid_api_key") | Some("session_expired")
        )
    }
}

impl ErrorDetails {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error_type: error_type.to_string(),
            code: None,
            message: message.to_string(),
            param: None,
            event_id: None,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_param(mut self, param: &str) -> Self {
        self.param = Some(param.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fatal_classification() {
        let auth = ErrorDetails::new("invalid_request_error", "bad key").with_code("invalid_api_key");
        assert!(auth.is_session_fatal());

        let expired =
            ErrorDetails::new("invalid_request_error", "gone").with_code("session_expired");
        assert!(expired.is_session_fatal());

        let turn_scoped = ErrorDetails::new("invalid_request_error", "buffer too small")
            .with_code("input_audio_buffer_commit_empty");
        assert!(!turn_scoped.is_session_fatal());

        let server_side = ErrorDetails::new("server_error", "transient");
        assert!(!server_side.is_session_fatal());
    }
}
