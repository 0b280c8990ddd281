//! # Hublink Client
//!
//! Connection lifecycle and RPC state machine for hub connections.
//!
//! Three state machines stack up to form a hub connection:
//!
//! ```text
//! ┌────────────────────────┐
//! │      HubConnection     │  handshake, invocations, streams,
//! │                        │  client methods, keep-alive
//! ├────────────────────────┤
//! │ ReconnectableConnection│  hides transient drops behind a
//! │                        │  reconnect policy
//! ├────────────────────────┤
//! │     HttpConnection     │  one negotiation + transport attempt,
//! │                        │  single-use
//! └────────────────────────┘
//! ```
//!
//! Each layer drives the one below through the `Connection` contract and
//! observes it through `ConnectionDelegate`; all user-visible events
//! surface on the configured callback queue.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hublink_client::{HubConnection, HubConnectionDelegate};
//! use hublink_core::{HttpConnectionOptions, IntervalReconnectPolicy};
//! use serde_json::json;
//! use url::Url;
//!
//! let hub = HubConnection::with_url(
//!     Url::parse("https://example.com/chat")?,
//!     HttpConnectionOptions::new(),
//!     Arc::new(IntervalReconnectPolicy::default()),
//! );
//! hub.set_delegate(Arc::downgrade(&delegate));
//! hub.start();
//!
//! // Once the delegate sees `did_open`:
//! hub.invoke::<i64>("Add", vec![json!(1), json!(2)], |result| {
//!     println!("1 + 2 = {result:?}");
//! });
//! ```

mod http_connection;
mod hub;
mod reconnectable;

pub use http_connection::{ConnectionState, HttpConnection};
pub use hub::{HubConnection, HubConnectionDelegate, MethodHandler, StreamHandle};
pub use reconnectable::{ReconnectableConnection, ReconnectableState};
