//! Transport contract: a duplex byte-message channel driven by the
//! connection layer.
//!
//! Concrete transports live in `hublink-transport`; this module only fixes
//! the surface the connection layer drives and the delegate surface it
//! expects events on.

use std::sync::{Arc, Weak};

use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::negotiate::AvailableTransport;
use crate::options::HttpConnectionOptions;

/// Completion callback for a single outbound write.
///
/// Invoked exactly once with the write outcome. Transports may invoke it
/// from any task, including inline on an immediate failure; the connection
/// layer reschedules user-supplied completions onto the callback queue.
pub type SendCompletion = Box<dyn FnOnce(ClientResult<()>) + Send + 'static>;

/// Events a transport reports to its owner.
///
/// A transport fires `transport_did_close` at most once, after which no
/// further events are delivered.
pub trait TransportDelegate: Send + Sync {
    /// The transport finished its opening handshake and is ready to send.
    fn transport_did_open(&self);

    /// A complete inbound message arrived.
    fn transport_did_receive_data(&self, data: Vec<u8>);

    /// The transport is gone, either because `close` was called or because
    /// the peer or network failed it.
    fn transport_did_close(&self, error: Option<ClientError>);
}

/// A duplex byte-message channel (text or binary frames).
pub trait Transport: Send + Sync {
    /// Opens the transport against `url`. Outcome is reported through the
    /// delegate: `transport_did_open` on success, `transport_did_close`
    /// otherwise.
    fn start(self: Arc<Self>, url: Url, options: Arc<HttpConnectionOptions>);

    /// Queues one message for sending. `completion` observes the write
    /// result.
    fn send(&self, data: Vec<u8>, completion: SendCompletion);

    /// Asks the transport to shut down. Idempotent.
    fn close(&self);

    /// Whether the transport already produces periodic traffic on its own,
    /// making hub-level keep-alive pings redundant.
    fn inherent_keep_alive(&self) -> bool {
        false
    }

    /// Installs the delegate receiving transport events.
    fn set_delegate(&self, delegate: Weak<dyn TransportDelegate>);
}

/// Selects and constructs a transport from the negotiation outcome.
pub trait TransportFactory: Send + Sync {
    /// Picks a transport from the server's advertised list.
    fn create(&self, available: &[AvailableTransport]) -> ClientResult<Arc<dyn Transport>>;
}
