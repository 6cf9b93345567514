use crate::protocol::error_shapes::{openai_error_payload, openai_upstream_error_payload};

/// Error type shared by the stream pipeline, the request normalizer and the
/// configuration layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Failed to decode upstream frame: {0}")]
    Decode(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream {
        status: u16,
        message: String,
        error_type: Option<String>,
        code: Option<String>,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl StreamError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Config(_)
            | StreamError::Decode(_)
            | StreamError::Transport(_)
            | StreamError::Internal(_) => ErrorCategory::ServerError,
            StreamError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// OpenAI-shaped error body for this error.
    ///
    /// Upstream errors keep the provider's own `type` and `code` when it sent
    /// them; everything else is derived from the category.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            StreamError::Upstream {
                message,
                error_type,
                code,
                ..
            } => openai_upstream_error_payload(
                self.category(),
                message,
                error_type.as_deref(),
                code.as_deref(),
            ),
            other => openai_error_payload(other.category(), &other.to_string()),
        }
    }

    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        http_status_for_category(self.category())
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(err.to_string())
    }
}

impl axum::response::IntoResponse for StreamError {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        (status, axum::Json(self.to_payload())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_status() {
        assert_eq!(
            category_from_upstream_status(400),
            ErrorCategory::InvalidRequest
        );
        assert_eq!(category_from_upstream_status(429), ErrorCategory::RateLimit);
        assert_eq!(category_from_upstream_status(503), ErrorCategory::ServerError);
        assert_eq!(category_from_upstream_status(302), ErrorCategory::Unknown);
    }

    #[test]
    fn test_decode_error_payload_is_server_error() {
        let err = StreamError::Decode("expected value at line 1 column 1".to_string());
        let payload = err.to_payload();
        assert_eq!(payload["error"]["type"], "server_error");
        assert!(payload["error"]["message"]
            .as_str()
            .unwrap()
            .contains("expected value"));
        assert_eq!(err.http_status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_upstream_error_keeps_provider_type_and_code() {
        let err = StreamError::Upstream {
            status: 400,
            message: "context too long".to_string(),
            error_type: Some("invalid_request_error".to_string()),
            code: Some("context_length_exceeded".to_string()),
        };
        let payload = err.to_payload();
        assert_eq!(payload["error"]["message"], "context too long");
        assert_eq!(payload["error"]["type"], "invalid_request_error");
        assert_eq!(payload["error"]["code"], "context_length_exceeded");
        assert_eq!(err.http_status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_json_error_converts_to_decode() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err = StreamError::from(json_err);
        assert!(matches!(err, StreamError::Decode(_)));
    }

    #[test]
    fn test_into_response_uses_category_status() {
        use axum::response::IntoResponse;

        let err = StreamError::Upstream {
            status: 429,
            message: "slow down".to_string(),
            error_type: None,
            code: None,
        };
        assert_eq!(
            err.into_response().status(),
            http::StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            StreamError::Transport("reset".to_string())
                .into_response()
                .status(),
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
