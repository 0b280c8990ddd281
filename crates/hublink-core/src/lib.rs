//! # Hublink Core
//!
//! Contracts and codecs shared by the Hublink hub-connection client.
//!
//! This crate fixes the seams between the layers of a hub connection and
//! implements the pure pieces that sit on those seams:
//!
//! - **Contracts**: the transport surface ([`Transport`],
//!   [`TransportDelegate`]), the connection surface ([`Connection`],
//!   [`ConnectionDelegate`]), and the negotiation HTTP client
//!   ([`NegotiateClient`]).
//! - **Codecs**: the hub-protocol handshake ([`protocol::handshake`]) and
//!   the JSON hub protocol ([`JsonHubProtocol`]).
//! - **State types**: connection options, reconnect policies, the error
//!   model, and the callback queue that serialises user-visible events.
//!
//! ## Layering
//!
//! ```text
//! ┌──────────────────┐
//! │  hublink-client  │  (connection + hub state machines)
//! ├──────────────────┤
//! │  hublink-core    │  <- this crate (contracts, codecs, options)
//! ├──────────────────┤
//! │ hublink-transport│  (WebSocket + HTTP implementations)
//! └──────────────────┘
//! ```
//!
//! Concrete transports and state machines depend on this crate; it depends
//! on neither.

pub mod callback;
pub mod connection;
pub mod error;
pub mod negotiate;
pub mod options;
pub mod protocol;
pub mod retry;
pub mod transport;

pub use callback::CallbackQueue;
pub use connection::{Connection, ConnectionDelegate};
pub use error::{ClientError, ClientResult};
pub use negotiate::{
    AvailableTransport, HttpResponse, NegotiateClient, NegotiatePayload, NegotiationResponse,
    Redirection, TransferFormat, negotiate_url, start_url,
};
pub use options::{AccessTokenProvider, HttpConnectionOptions, NegotiateClientFactory};
pub use protocol::json::JsonHubProtocol;
pub use protocol::{
    ArgumentExtractor, CancelInvocationMessage, CloseMessage, CompletionMessage, HubMessage,
    HubProtocol, InvocationMessage, RECORD_SEPARATOR, StreamItemMessage,
};
pub use retry::{IntervalReconnectPolicy, NoReconnectPolicy, ReconnectPolicy, RetryContext};
pub use transport::{SendCompletion, Transport, TransportDelegate, TransportFactory};
