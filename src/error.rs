//! Relay error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::queue::QueueError;
use crate::relay::stage::RelayStage;

/// Errors surfaced by the relay pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Target URL scheme is neither `http` nor `https`.
    #[error("Unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    /// Target URL could not be parsed or has no host.
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A header name or value could not be represented.
    #[error("Invalid header '{name}'")]
    InvalidHeader { name: String },

    /// No `traceparent` header and synthesis is disabled.
    #[error("Missing trace context header '{header}'")]
    MissingTraceContext { header: &'static str },

    /// `traceparent` is present but not a 4-segment token.
    #[error("Invalid trace context '{value}': expected 4 segments, found {segments}")]
    InvalidTraceContext { value: String, segments: usize },

    /// The inbound body could not be read.
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] axum::Error),

    /// The downstream answered with a non-2xx status.
    #[error("Downstream returned {status}: {reason}")]
    DownstreamStatus { status: StatusCode, reason: String },

    /// The downstream call failed before a response was received.
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The queue transport rejected the message.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid relay transition from {from:?} to {to:?}")]
    InvalidTransition { from: RelayStage, to: RelayStage },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// HTTP status reported to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::UnsupportedScheme { .. }
            | RelayError::InvalidUrl { .. }
            | RelayError::InvalidHeader { .. }
            | RelayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            RelayError::MissingTraceContext { .. } | RelayError::InvalidTraceContext { .. } => {
                StatusCode::NOT_ACCEPTABLE
            }
            RelayError::DownstreamStatus { status, .. } => *status,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RelayError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::InvalidTransition { .. } => StatusCode::CONFLICT,
            RelayError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether handing the same message out again could succeed.
    ///
    /// Only failures on the far side of the network are worth redelivering;
    /// anything about the message itself fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::DownstreamStatus { .. } | RelayError::Upstream(_) | RelayError::Queue(_)
        )
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = RelayError::UnsupportedScheme { scheme: "ftp".into() };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = RelayError::MissingTraceContext { header: "traceparent" };
        assert_eq!(err.status(), StatusCode::NOT_ACCEPTABLE);

        let err = RelayError::InvalidTraceContext { value: "00-abc".into(), segments: 2 };
        assert_eq!(err.status(), StatusCode::NOT_ACCEPTABLE);

        let err = RelayError::DownstreamStatus {
            status: StatusCode::SERVICE_UNAVAILABLE,
            reason: "Service Unavailable".into(),
        };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = RelayError::Queue(QueueError::Closed);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = RelayError::InvalidTransition {
            from: RelayStage::Enqueued,
            to: RelayStage::Completed,
        };
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_only_downstream_failures_are_retryable() {
        let downstream = RelayError::DownstreamStatus {
            status: StatusCode::BAD_GATEWAY,
            reason: "Bad Gateway".into(),
        };
        assert!(downstream.is_retryable());
        assert!(RelayError::Queue(QueueError::Closed).is_retryable());

        assert!(!RelayError::MissingTraceContext { header: "traceparent" }.is_retryable());
        assert!(!RelayError::InvalidTraceContext { value: "x".into(), segments: 1 }.is_retryable());
        assert!(!RelayError::UnsupportedScheme { scheme: "ftp".into() }.is_retryable());
        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!RelayError::Serialization(malformed).is_retryable());
    }

    #[test]
    fn test_error_body_is_json() {
        let response = RelayError::UnsupportedScheme { scheme: "ftp".into() }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
