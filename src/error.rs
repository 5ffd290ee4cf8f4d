//! Error taxonomy.
//!
//! Each external collaborator gets its own error type so callers can apply
//! the right policy: retrieval degrades on any of them, ingestion aborts on
//! [`ProviderError`] but skips the chunk on [`StoreError`], and the HTTP
//! layer maps [`ChatError`] onto status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure of an embedding or completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider requires a credential that is not configured.
    #[error("{0} is not set")]
    MissingCredential(&'static str),

    /// Transport-level failure (connect, TLS, timeout, body read).
    #[error("request to {provider} failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The provider answered but the response holds no usable vector.
    #[error("{0} returned no embedding")]
    EmptyResponse(&'static str),

    /// The in-process model failed to load or run.
    #[error("local embedding failed: {0}")]
    Local(String),

    /// The requested provider is not compiled into this binary.
    #[error("embedding provider '{0}' is not available in this build")]
    Unavailable(String),

    /// No response headers arrived within the configured timeout.
    #[error("{0} did not respond in time")]
    Timeout(&'static str),
}

/// Failure of the vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store is not configured (missing {0})")]
    NotConfigured(&'static str),

    #[error("vector store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("vector store rejected the record: {0}")]
    Rejected(String),
}

/// Errors surfaced by the `/chat` endpoint.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed or incomplete request body (400).
    #[error("{0}")]
    Validation(String),

    /// A required setting is missing at the completion call site (500).
    #[error("{0}")]
    Configuration(String),

    /// The completion provider failed before streaming started (500).
    #[error("upstream error: {0}")]
    Upstream(#[from] ProviderError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Configuration(_) | ChatError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "bad_request",
            ChatError::Configuration(_) => "internal",
            ChatError::Upstream(_) => "upstream_error",
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ChatError::Validation("message must not be empty".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn upstream_carries_provider_text() {
        let err = ChatError::from(ProviderError::Status {
            provider: "completion provider",
            status: 401,
            body: "invalid key".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("invalid key"));
    }
}
