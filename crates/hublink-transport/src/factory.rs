//! Transport selection over the negotiation response.

use std::sync::Arc;

use hublink_core::{AvailableTransport, ClientError, ClientResult, Transport, TransportFactory};

use crate::websocket::WebSocketTransport;

const WEBSOCKETS: &str = "WebSockets";

/// Picks the first transport this client can speak.
///
/// Only WebSockets is supported; a server that advertises none fails the
/// open.
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, available: &[AvailableTransport]) -> ClientResult<Arc<dyn Transport>> {
        for candidate in available {
            if candidate.transport.eq_ignore_ascii_case(WEBSOCKETS) {
                return Ok(Arc::new(WebSocketTransport::new()));
            }
        }
        Err(ClientError::InvalidOperation(
            "server offers no supported transport".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hublink_core::TransferFormat;

    #[test]
    fn selects_websockets_when_advertised() {
        let available = vec![
            AvailableTransport {
                transport: "ServerSentEvents".into(),
                transfer_formats: vec![TransferFormat::Text],
            },
            AvailableTransport::websocket(),
        ];
        assert!(DefaultTransportFactory.create(&available).is_ok());
    }

    #[test]
    fn fails_when_nothing_usable_is_advertised() {
        let available = vec![AvailableTransport {
            transport: "LongPolling".into(),
            transfer_formats: vec![TransferFormat::Text],
        }];
        assert!(matches!(
            DefaultTransportFactory.create(&available),
            Err(ClientError::InvalidOperation(_))
        ));
    }
}
