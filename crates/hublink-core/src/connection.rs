//! Connection contract shared by the single-attempt and reconnecting
//! connection layers.
//!
//! The hub layer drives either connection flavour through [`Connection`]
//! and observes it through [`ConnectionDelegate`]. Delegates are held
//! weakly; every notification upgrades at delivery time so a connection
//! outliving its owner goes quiet instead of dangling.

use std::sync::{Arc, Weak};

use crate::error::ClientError;
use crate::transport::SendCompletion;

/// Events a connection reports to its owner.
///
/// The reconnect-specific notifications have no-op defaults; a
/// single-attempt connection never emits them.
pub trait ConnectionDelegate: Send + Sync {
    /// The connection is open and ready to send.
    fn connection_did_open(&self, connection_id: Option<String>);

    /// The connection could not be opened.
    fn connection_did_fail_to_open(&self, error: ClientError);

    /// A complete inbound frame arrived.
    fn connection_did_receive_data(&self, data: Vec<u8>);

    /// The connection is gone. Emitted exactly once per successful open.
    fn connection_did_close(&self, error: Option<ClientError>);

    /// A reconnect episode is starting because of `error`.
    fn connection_will_reconnect(&self, _error: ClientError) {}

    /// A reconnect episode finished and the connection is open again.
    fn connection_did_reconnect(&self) {}

    /// A reconnect attempt is being scheduled; `attempt` counts the
    /// failures that preceded it, starting at zero.
    fn connection_reconnect_attempt(&self, _attempt: u32) {}
}

/// A duplex connection carrying opaque frames.
pub trait Connection: Send + Sync + 'static {
    /// Begins opening the connection. Outcome arrives on the delegate.
    fn start(self: Arc<Self>);

    /// Queues one frame for sending. `completion` is always invoked
    /// asynchronously.
    fn send(&self, data: Vec<u8>, completion: SendCompletion);

    /// Tears the connection down, reporting `error` through the close
    /// notification. Idempotent.
    fn stop(self: Arc<Self>, error: Option<ClientError>);

    /// Installs the delegate receiving connection events.
    fn set_delegate(&self, delegate: Weak<dyn ConnectionDelegate>);

    /// The server-assigned connection ID, once known.
    fn connection_id(&self) -> Option<String>;

    /// Whether the active transport produces periodic traffic on its own.
    fn inherent_keep_alive(&self) -> bool;
}
