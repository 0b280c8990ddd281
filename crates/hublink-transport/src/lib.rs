//! # Hublink Transport
//!
//! Concrete implementations of the transport-facing contracts defined in
//! `hublink-core`.
//!
//! | Contract | Implementation | Backed by |
//! |----------|----------------|-----------|
//! | `Transport` | [`WebSocketTransport`] | `tokio-tungstenite` |
//! | `NegotiateClient` | [`HttpNegotiateClient`] | `reqwest` |
//! | `TransportFactory` | [`DefaultTransportFactory`] | — |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  hublink-client  │  (drives transports through the contracts)
//! ├──────────────────┤
//! │  hublink-core    │  (contract traits)
//! ├──────────────────┤
//! │ hublink-transport│  <- this crate (implementations)
//! ├──────────────────┤
//! │ Network (TCP/TLS)│
//! └──────────────────┘
//! ```

mod factory;
mod http;
mod websocket;

pub use factory::DefaultTransportFactory;
pub use http::HttpNegotiateClient;
pub use websocket::WebSocketTransport;
