//! Hub layer: the RPC state machine running on top of a connection.

mod connection;
mod invocation;

pub use connection::HubConnection;

use std::sync::Arc;

use hublink_core::{ArgumentExtractor, ClientError, ClientResult};

/// User-visible lifecycle events of a hub connection.
///
/// All notifications arrive on the configured callback queue. `did_open`
/// and `did_reconnect` are mutually exclusive per session and always
/// precede any method callback or completion from that session;
/// `did_close` is the final notification of a session.
pub trait HubConnectionDelegate: Send + Sync {
    /// The hub handshake completed; the connection is usable.
    fn did_open(&self);

    /// The connection could not be opened.
    fn did_fail_to_open(&self, error: ClientError);

    /// The connection is gone.
    fn did_close(&self, error: Option<ClientError>);

    /// The connection dropped and a reconnect episode is starting.
    fn will_reconnect(&self, _error: ClientError) {}

    /// A reconnect episode finished; the connection is usable again.
    fn did_reconnect(&self) {}
}

/// Handler for a client-bound method invocation.
///
/// Receives the invocation's arguments as an extractor; a returned error
/// is logged, never propagated to the server.
pub type MethodHandler = Arc<dyn Fn(ArgumentExtractor) -> ClientResult<()> + Send + Sync>;

/// Identifies a streaming invocation for cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    invocation_id: String,
}

impl StreamHandle {
    /// Wraps a raw invocation ID.
    pub fn from_raw(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
        }
    }

    /// The invocation ID this handle refers to.
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }
}
