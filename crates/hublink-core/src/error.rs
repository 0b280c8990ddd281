//! Unified error types for the Hublink client.
//!
//! Every user-visible failure flows through [`ClientError`], whether it is
//! delivered through a delegate callback or a per-operation completion.
//! Variants are `Clone` because a single connection-level failure can fan
//! out to many pending invocation completions; foreign error types are
//! rendered to strings at the conversion boundary to keep that possible.

use thiserror::Error;

/// Errors surfaced by the connection and hub layers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// An operation was issued in a state that does not allow it.
    #[error("operation issued in an invalid connection state")]
    InvalidState,

    /// The caller misused the protocol surface.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The negotiation endpoint returned a payload we cannot use.
    #[error("invalid negotiation response: {0}")]
    InvalidNegotiationResponse(String),

    /// Negotiation or WebSocket upgrade failed at the HTTP level.
    #[error("web request failed with status code {status_code}")]
    Web {
        /// The HTTP status code of the failed request.
        status_code: u16,
    },

    /// The operation raced the closing transition of the connection.
    #[error("connection is being closed")]
    ConnectionIsBeingClosed,

    /// A send was issued while the connection is reconnecting.
    #[error("connection is reconnecting")]
    ConnectionIsReconnecting,

    /// The server closed the hub connection, optionally with a reason.
    #[error("connection closed by the server{}", display_server_reason(.0))]
    ServerClose(Option<String>),

    /// A pending invocation was aborted by connection close without a more
    /// specific error.
    #[error("invocation cancelled by connection close")]
    InvocationCancelled,

    /// The server completed an invocation with an error.
    #[error("invocation failed: {0}")]
    InvocationFailed(String),

    /// The hub protocol handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A hub message could not be parsed or written.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

fn display_server_reason(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {r}"),
        None => String::new(),
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_close_display_includes_reason() {
        let err = ClientError::ServerClose(Some("kicked".into()));
        assert_eq!(err.to_string(), "connection closed by the server: kicked");

        let err = ClientError::ServerClose(None);
        assert_eq!(err.to_string(), "connection closed by the server");
    }

    #[test]
    fn serde_errors_become_serialization_errors() {
        let err = serde_json::from_str::<i64>("not json").unwrap_err();
        let converted: ClientError = err.into();
        assert!(matches!(converted, ClientError::Serialization(_)));
    }

    #[test]
    fn web_error_carries_status_code() {
        let err = ClientError::Web { status_code: 503 };
        assert_eq!(err.to_string(), "web request failed with status code 503");
    }
}
