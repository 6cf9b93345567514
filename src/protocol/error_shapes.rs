use serde::Deserialize;

use crate::error::{ErrorCategory, StreamError};

use super::openai_chat::OpenAiErrorBody;

#[derive(Deserialize)]
struct OpenAiErrorEnvelope {
    #[serde(default)]
    error: Option<OpenAiErrorBody>,
}

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::Permission => "permission_error",
        ErrorCategory::RateLimit => "rate_limit_error",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

fn openai_error_code(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request",
        ErrorCategory::Authentication => "invalid_api_key",
        ErrorCategory::Permission => "permission_denied",
        ErrorCategory::RateLimit => "rate_limit_exceeded",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

#[must_use]
pub(crate) fn openai_error_payload(cat: ErrorCategory, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": openai_error_type(cat),
            "code": openai_error_code(cat),
            "param": null,
        }
    })
}

#[must_use]
pub(crate) fn openai_upstream_error_payload(
    cat: ErrorCategory,
    message: &str,
    error_type: Option<&str>,
    code: Option<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": error_type.unwrap_or_else(|| openai_error_type(cat)),
            "code": code.unwrap_or_else(|| openai_error_code(cat)),
            "param": null,
        }
    })
}

/// Translate an error object embedded in an upstream payload.
///
/// Returns `None` when the object carries no message; some providers send
/// `"error": {}` or `"error": null` on healthy frames.
#[must_use]
pub fn upstream_error_from_body(body: &OpenAiErrorBody, status: u16) -> Option<StreamError> {
    if body.message.is_empty() {
        return None;
    }
    let code = body.code.as_ref().and_then(|code| match code {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    Some(StreamError::Upstream {
        status,
        message: body.message.clone(),
        error_type: body.type_.clone().filter(|t| !t.is_empty()),
        code,
    })
}

/// Normalize the body of a non-success upstream response.
///
/// An OpenAI-shaped `{"error":{...}}` body keeps its message, type and code;
/// anything else becomes a message built from the raw body text.
#[must_use]
pub fn upstream_error_from_response_body(status: u16, body: &[u8]) -> StreamError {
    let parsed = serde_json::from_slice::<OpenAiErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| upstream_error_from_body(&error, status));
    if let Some(err) = parsed {
        return err;
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let message = if text.is_empty() {
        format!("upstream returned HTTP {status}")
    } else {
        text.to_string()
    };
    StreamError::Upstream {
        status,
        message,
        error_type: None,
        code: None,
    }
}
