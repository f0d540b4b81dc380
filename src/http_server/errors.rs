//! # HTTP Errors
//!
//! Operator-facing failures are answered as plain text with the status
//! code that classifies them.

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;

use crate::dynconfig::ConfigMergeError;
use crate::restart::RestartError;
use crate::switchover::SwitchoverOutcome;

/// Errors raised by route handlers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Body is not valid JSON
    #[error("Invalid JSON body: {0}")]
    MalformedBody(String),

    #[error("{message}")]
    Status { status: u16, message: String },

    /// A blocking task did not complete
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::MalformedBody(_) => 400,
            ApiError::Status { status, .. } => *status,
            ApiError::Internal(_) => 500,
        }
    }
}

impl From<RestartError> for ApiError {
    fn from(err: RestartError) -> Self {
        ApiError::status(err.status_code(), err.to_string())
    }
}

impl From<ConfigMergeError> for ApiError {
    fn from(err: ConfigMergeError) -> Self {
        ApiError::status(err.status_code(), err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        text_response(self.status_code(), self.to_string())
    }
}

/// Plain text response with an arbitrary status.
pub fn text_response(status: u16, message: impl Into<String>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, message.into()).into_response()
}

impl IntoResponse for SwitchoverOutcome {
    fn into_response(self) -> Response {
        text_response(self.status, self.message)
    }
}

/// Parse an optional JSON body. An empty body reads as `{}`.
pub fn parse_json_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::MalformedBody(e.to_string()))
}

/// Parse a mandatory JSON object body. Empty bodies are refused.
pub fn parse_json_object_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::status(400, "Configuration must be a JSON object"));
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::MalformedBody(e.to_string()))?;
    if !value.is_object() {
        return Err(ApiError::status(400, "Configuration must be a JSON object"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_body_is_empty_object() {
        assert_eq!(parse_json_body(&Bytes::new()).unwrap(), json!({}));
        assert_eq!(parse_json_body(&Bytes::from_static(b" \n")).unwrap(), json!({}));
    }

    #[test]
    fn test_object_body_is_mandatory() {
        let err = parse_json_object_body(&Bytes::new()).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Configuration must be a JSON object");
        let err = parse_json_object_body(&Bytes::from_static(b"[1]")).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            parse_json_object_body(&Bytes::from_static(b"{\"ttl\": 30}")).unwrap(),
            json!({"ttl": 30})
        );
    }

    #[test]
    fn test_malformed_body() {
        let err = parse_json_body(&Bytes::from_static(b"foobar=baz")).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_restart_errors_keep_codes() {
        let err: ApiError = RestartError::InvalidRole.into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.to_string(),
            "PostgreSQL role should be either primary, standby_leader, or replica"
        );
    }
}
