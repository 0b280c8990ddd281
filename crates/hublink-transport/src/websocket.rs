//! WebSocket transport implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use hublink_core::{
    ClientError, HttpConnectionOptions, SendCompletion, Transport, TransportDelegate,
};

struct OutboundFrame {
    data: Vec<u8>,
    completion: SendCompletion,
}

/// A [`Transport`] over a client WebSocket connection.
///
/// `start` spawns a single task owning both halves of the socket: it
/// drains the outbound queue, answers protocol pings, and forwards inbound
/// frames to the delegate. The delegate sees `transport_did_close` exactly
/// once, whichever side ends the connection.
pub struct WebSocketTransport {
    delegate: Mutex<Option<Weak<dyn TransportDelegate>>>,
    outbound: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Creates a transport that has not been started yet.
    pub fn new() -> Self {
        Self {
            delegate: Mutex::new(None),
            outbound: Mutex::new(None),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn delegate(&self) -> Option<Arc<dyn TransportDelegate>> {
        self.delegate.lock().as_ref().and_then(Weak::upgrade)
    }

    fn fire_close(&self, error: Option<ClientError>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(delegate) = self.delegate() {
            delegate.transport_did_close(error);
        }
    }

    async fn run(self: Arc<Self>, url: Url, options: Arc<HttpConnectionOptions>) {
        let ws_url = to_ws_url(url);
        info!(url = %ws_url, "Connecting WebSocket transport");

        let mut request = match ws_url.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => {
                self.fire_close(Some(ClientError::Transport(e.to_string())));
                return;
            }
        };
        for (key, value) in &options.headers {
            match (HeaderName::try_from(key.as_str()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                _ => warn!(header = %key, "Skipping invalid header"),
            }
        }
        if let Some(token) = options.access_token() {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    request.headers_mut().insert("Authorization", value);
                }
                Err(_) => warn!("Skipping malformed access token"),
            }
        }

        let mut config = WebSocketConfig::default();
        if let Some(size) = options.max_message_size {
            config = config.max_message_size(Some(size));
        }

        let connector = if options.accept_invalid_certs {
            match native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
            {
                Ok(tls) => Some(Connector::NativeTls(tls)),
                Err(e) => {
                    self.fire_close(Some(ClientError::Transport(e.to_string())));
                    return;
                }
            }
        } else {
            None
        };

        let ws_stream = match tokio_tungstenite::connect_async_tls_with_config(
            request,
            Some(config),
            false,
            connector,
        )
        .await
        {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!(url = %ws_url, error = %e, "WebSocket connection failed");
                self.fire_close(Some(ClientError::Transport(e.to_string())));
                return;
            }
        };

        info!(url = %ws_url, "WebSocket transport connected");
        let (mut sink, mut stream) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(256);
        *self.outbound.lock() = Some(outbound_tx);
        if let Some(delegate) = self.delegate() {
            delegate.transport_did_open();
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Closing WebSocket transport");
                    let _ = sink.close().await;
                    self.fire_close(None);
                    break;
                }

                Some(frame) = outbound_rx.recv() => {
                    // Text when the payload is valid UTF-8, binary otherwise.
                    let message = match String::from_utf8(frame.data) {
                        Ok(text) => Message::text(text),
                        Err(raw) => Message::binary(raw.into_bytes()),
                    };
                    match sink.send(message).await {
                        Ok(()) => (frame.completion)(Ok(())),
                        Err(e) => {
                            warn!(error = %e, "WebSocket send failed");
                            (frame.completion)(Err(ClientError::Transport(e.to_string())));
                        }
                    }
                }

                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Received text frame");
                            if let Some(delegate) = self.delegate() {
                                delegate.transport_did_receive_data(text.as_bytes().to_vec());
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            trace!(len = data.len(), "Received binary frame");
                            if let Some(delegate) = self.delegate() {
                                delegate.transport_did_receive_data(data.to_vec());
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                        Some(Ok(Message::Close(_))) => {
                            info!("Server closed the WebSocket");
                            self.fire_close(None);
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            self.fire_close(Some(ClientError::Transport(e.to_string())));
                            break;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            self.fire_close(None);
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn start(self: Arc<Self>, url: Url, options: Arc<HttpConnectionOptions>) {
        tokio::spawn(self.run(url, options));
    }

    fn send(&self, data: Vec<u8>, completion: SendCompletion) {
        let sender = self.outbound.lock().clone();
        let Some(sender) = sender else {
            completion(Err(ClientError::InvalidState));
            return;
        };
        if let Err(rejected) = sender.try_send(OutboundFrame { data, completion }) {
            let frame = rejected.into_inner();
            (frame.completion)(Err(ClientError::Transport("send queue unavailable".into())));
        }
    }

    fn close(&self) {
        self.shutdown.cancel();
    }

    fn set_delegate(&self, delegate: Weak<dyn TransportDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }
}

/// Maps an HTTP(S) URL onto the matching WebSocket scheme.
fn to_ws_url(mut url: Url) -> Url {
    let mapped = match url.scheme() {
        "http" => Some("ws"),
        "https" => Some("wss"),
        _ => None,
    };
    if let Some(scheme) = mapped {
        let _ = url.set_scheme(scheme);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_http_schemes_to_websocket_schemes() {
        let url = to_ws_url(Url::parse("http://example.com/chat?id=1").unwrap());
        assert_eq!(url.as_str(), "ws://example.com/chat?id=1");

        let url = to_ws_url(Url::parse("https://example.com/chat").unwrap());
        assert_eq!(url.as_str(), "wss://example.com/chat");

        let url = to_ws_url(Url::parse("wss://example.com/chat").unwrap());
        assert_eq!(url.as_str(), "wss://example.com/chat");
    }

    #[tokio::test]
    async fn send_before_start_fails_with_invalid_state() {
        let transport = WebSocketTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.send(
            b"hello".to_vec(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        assert_eq!(rx.recv().await, Some(Err(ClientError::InvalidState)));
    }
}
