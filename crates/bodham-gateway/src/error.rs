use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced a response (DNS, refused, reset, timeout).
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Server returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status { status: u16, message: Option<String> },

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request path '{0}'")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Human-readable text for a banner or toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message: Some(msg), .. } => msg.clone(),
            Self::Status { status, .. } => format!("Request failed ({status})"),
            Self::Network(_) => "Could not reach the server".to_string(),
            other => other.to_string(),
        }
    }
}

/// Pull the server's explanation out of an error body.
///
/// FastAPI puts it in `detail`, either as a string or as a list of
/// validation errors carrying `msg`. Other handlers use `message` or `error`.
pub(crate) fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.to_string());
    };

    match json.get("detail") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Array(items)) => {
            if let Some(msg) = items
                .iter()
                .find_map(|item| item.get("msg").and_then(Value::as_str))
            {
                return Some(msg.to_string());
            }
        }
        _ => {}
    }

    ["message", "error"]
        .iter()
        .find_map(|key| json.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_string() {
        assert_eq!(
            extract_message(r#"{"detail":"Post not found or unauthorized"}"#).as_deref(),
            Some("Post not found or unauthorized")
        );
    }

    #[test]
    fn test_detail_validation_list() {
        let body = r#"{"detail":[{"loc":["query","user_id"],"msg":"field required","type":"value_error.missing"}]}"#;
        assert_eq!(extract_message(body).as_deref(), Some("field required"));
    }

    #[test]
    fn test_message_field_and_plain_text() {
        assert_eq!(
            extract_message(r#"{"message":"Internal Server Error"}"#).as_deref(),
            Some("Internal Server Error")
        );
        assert_eq!(extract_message("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(extract_message("   "), None);
        assert_eq!(extract_message(r#"{"ok":false}"#), None);
    }

    #[test]
    fn test_user_message_falls_back_to_status() {
        let err = GatewayError::Status { status: 503, message: None };
        assert_eq!(err.user_message(), "Request failed (503)");
        assert_eq!(err.to_string(), "Server returned 503: no message");
    }
}
