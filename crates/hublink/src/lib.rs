//! # Hublink
//!
//! A client for bidirectional RPC-over-WebSocket hub connections.
//!
//! ## Overview
//!
//! A hub connection negotiates a transport over HTTP, opens a persistent
//! WebSocket channel, agrees on a framing protocol, and then exchanges
//! remote procedure calls in both directions: the client invokes server
//! methods (with single results or server-push streams), the server
//! invokes methods the client registered. Transient drops are healed by a
//! pluggable reconnect policy; a keep-alive heartbeat keeps quiet links
//! open.
//!
//! ## Architecture
//!
//! ```text
//! application ──▶ HubConnection ──▶ ReconnectableConnection
//!                                        │
//!                                        ▼
//!                                  HttpConnection ──▶ WebSocketTransport ──▶ network
//! ```
//!
//! - [`HubConnection`]: invocation tracking, client-method dispatch,
//!   keep-alive, the hub handshake
//! - [`ReconnectableConnection`]: retry policy over fresh connection
//!   attempts
//! - [`HttpConnection`]: negotiation plus one transport lifetime
//! - [`WebSocketTransport`] / [`HttpNegotiateClient`]: the network edge
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hublink::{HttpConnectionOptions, HubConnection, IntervalReconnectPolicy};
//! use serde_json::json;
//! use url::Url;
//!
//! let hub = HubConnection::with_url(
//!     Url::parse("https://example.com/chat")?,
//!     HttpConnectionOptions::new().with_access_token("secret"),
//!     Arc::new(IntervalReconnectPolicy::default()),
//! );
//! hub.set_delegate(Arc::downgrade(&my_delegate));
//! hub.on("broadcast", |mut arguments| {
//!     let text: String = arguments.take()?;
//!     println!("server says: {text}");
//!     Ok(())
//! });
//! hub.start();
//! ```

pub use hublink_core::{
    ArgumentExtractor, AvailableTransport, CallbackQueue, ClientError, ClientResult, Connection,
    ConnectionDelegate, HttpConnectionOptions, HubMessage, HubProtocol, IntervalReconnectPolicy,
    JsonHubProtocol, NegotiateClient, NoReconnectPolicy, ReconnectPolicy, RetryContext,
    TransferFormat, Transport, TransportDelegate, TransportFactory,
};

pub use hublink_client::{
    ConnectionState, HttpConnection, HubConnection, HubConnectionDelegate, MethodHandler,
    ReconnectableConnection, ReconnectableState, StreamHandle,
};

pub use hublink_transport::{DefaultTransportFactory, HttpNegotiateClient, WebSocketTransport};
