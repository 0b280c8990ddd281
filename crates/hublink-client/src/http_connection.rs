//! Single-attempt HTTP connection: negotiation, transport start, connected
//! lifetime, stop.
//!
//! Each instance is single-use. Its life is `Initial → Connecting →
//! {Connected → Stopped | Stopped}`; once `Stopped` it can only be thrown
//! away. Reconnection is layered on top by
//! [`ReconnectableConnection`](crate::ReconnectableConnection), which
//! creates a fresh instance per attempt.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use hublink_core::negotiate::{negotiate_url, start_url};
use hublink_core::{
    AvailableTransport, CallbackQueue, ClientError, ClientResult, Connection, ConnectionDelegate,
    HttpConnectionOptions, NegotiateClient, NegotiatePayload, NegotiationResponse, SendCompletion,
    Transport, TransportDelegate, TransportFactory,
};
use hublink_transport::{DefaultTransportFactory, HttpNegotiateClient};

/// Redirect budget for the negotiation loop.
const MAX_NEGOTIATE_REDIRECTS: usize = 100;

/// Lifecycle states of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, `start` not called yet.
    Initial,
    /// Negotiating or waiting for the transport to open.
    Connecting,
    /// Transport open, frames flowing.
    Connected,
    /// Terminal. Set by `stop`, open failure, or transport close.
    Stopped,
}

/// A single connection attempt over a negotiated transport.
///
/// The start gate is a one-shot latch closed on every terminal path of
/// `start` (transport open, open failure, transport closed while
/// connecting). `stop` waits on it before tearing the transport down, so a
/// stop racing a start never observes a half-initialised transport.
pub struct HttpConnection {
    transport_factory: Arc<dyn TransportFactory>,
    negotiate_client: Arc<dyn NegotiateClient>,
    url: Mutex<Url>,
    options: Mutex<Arc<HttpConnectionOptions>>,
    state: Mutex<ConnectionState>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    /// Connection ID from negotiation, published at transport open.
    pending_connection_id: Mutex<Option<String>>,
    connection_id: Mutex<Option<String>>,
    stop_error: Mutex<Option<ClientError>>,
    start_gate: CancellationToken,
    delegate: Mutex<Option<Weak<dyn ConnectionDelegate>>>,
    queue: CallbackQueue,
}

impl HttpConnection {
    /// Creates a connection using the stock WebSocket transport and HTTP
    /// negotiation client.
    pub fn new(url: Url, options: HttpConnectionOptions) -> Arc<Self> {
        let negotiate_client: Arc<dyn NegotiateClient> = match &options.negotiate_client_factory {
            Some(factory) => factory(),
            None => Arc::new(HttpNegotiateClient::new(&options)),
        };
        Self::with_dependencies(url, options, Arc::new(DefaultTransportFactory), negotiate_client)
    }

    /// Creates a connection with explicit collaborators.
    pub fn with_dependencies(
        url: Url,
        options: HttpConnectionOptions,
        transport_factory: Arc<dyn TransportFactory>,
        negotiate_client: Arc<dyn NegotiateClient>,
    ) -> Arc<Self> {
        let queue = options.callback_queue.clone();
        Arc::new(Self {
            transport_factory,
            negotiate_client,
            url: Mutex::new(url),
            options: Mutex::new(Arc::new(options)),
            state: Mutex::new(ConnectionState::Initial),
            transport: Mutex::new(None),
            pending_connection_id: Mutex::new(None),
            connection_id: Mutex::new(None),
            stop_error: Mutex::new(None),
            start_gate: CancellationToken::new(),
            delegate: Mutex::new(None),
            queue,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Moves to `to` if the current state is `from` (or unconditionally
    /// when `from` is `None`). Returns the previous state on success.
    fn change_state(
        &self,
        from: Option<ConnectionState>,
        to: ConnectionState,
    ) -> Option<ConnectionState> {
        let mut state = self.state.lock();
        let current = *state;
        if from.is_none_or(|expected| expected == current) {
            *state = to;
            Some(current)
        } else {
            None
        }
    }

    fn current_options(&self) -> Arc<HttpConnectionOptions> {
        self.options.lock().clone()
    }

    fn post_delegate(&self, notify: impl FnOnce(Arc<dyn ConnectionDelegate>) + Send + 'static) {
        let delegate = self.delegate.lock().clone();
        self.queue.post(move || {
            if let Some(delegate) = delegate.and_then(|weak| weak.upgrade()) {
                notify(delegate);
            }
        });
    }

    async fn start_task(self: Arc<Self>) {
        if self.current_options().skip_negotiation {
            match self.transport_factory.create(&[AvailableTransport::websocket()]) {
                Ok(transport) => self.start_transport(transport, None),
                Err(e) => self.fail_open(e),
            }
            return;
        }

        match self.negotiate().await {
            Ok(response) => match self.transport_factory.create(&response.available_transports) {
                Ok(transport) => {
                    *self.pending_connection_id.lock() = Some(response.connection_id.clone());
                    self.start_transport(transport, Some(response.start_id().to_string()));
                }
                Err(e) => self.fail_open(e),
            },
            Err(e) => self.fail_open(e),
        }
    }

    async fn negotiate(&self) -> ClientResult<NegotiationResponse> {
        let mut redirects = 0;
        loop {
            let endpoint = negotiate_url(&self.url.lock())?;
            let token = self.current_options().access_token();
            debug!(url = %endpoint, "Negotiating");

            let response = self.negotiate_client.post(&endpoint, token).await?;
            match response.status_code {
                200 => match NegotiatePayload::parse(&response.body)? {
                    NegotiatePayload::Redirection(redirect) => {
                        redirects += 1;
                        if redirects > MAX_NEGOTIATE_REDIRECTS {
                            return Err(ClientError::InvalidNegotiationResponse(
                                "too many redirects".into(),
                            ));
                        }
                        info!(url = %redirect.url, "Negotiation redirected");
                        *self.url.lock() = redirect.url;
                        if let Some(token) = redirect.access_token {
                            let mut options = self.options.lock();
                            *options = Arc::new(options.with_fixed_token(token));
                        }
                    }
                    NegotiatePayload::Negotiation(negotiation) => return Ok(negotiation),
                },
                status if (100..200).contains(&status) => {
                    // Informational; keep waiting for a terminal response.
                    debug!(status, "Interim negotiation response");
                }
                status => return Err(ClientError::Web { status_code: status }),
            }
        }
    }

    fn start_transport(self: &Arc<Self>, transport: Arc<dyn Transport>, start_id: Option<String>) {
        if *self.state.lock() == ConnectionState::Stopped {
            debug!("Connection stopped during negotiation");
            self.start_gate.cancel();
            return;
        }

        let url = start_url(&self.url.lock(), start_id.as_deref());
        *self.transport.lock() = Some(transport.clone());
        let delegate: Arc<dyn TransportDelegate> = self.clone();
        transport.set_delegate(Arc::downgrade(&delegate));
        info!(url = %url, "Starting transport");
        transport.start(url, self.current_options());
    }

    fn fail_open(&self, error: ClientError) {
        let previous = self.change_state(None, ConnectionState::Stopped);
        self.start_gate.cancel();
        if previous == Some(ConnectionState::Stopped) {
            // Stop raced the start; its waiter reports the close.
            debug!(error = %error, "Start already aborted by stop");
            return;
        }
        warn!(error = %error, "Connection failed to open");
        self.post_delegate(move |delegate| delegate.connection_did_fail_to_open(error));
    }
}

impl Connection for HttpConnection {
    fn start(self: Arc<Self>) {
        if self
            .change_state(Some(ConnectionState::Initial), ConnectionState::Connecting)
            .is_none()
        {
            warn!("Start ignored, connection instances are single-use");
            self.post_delegate(|delegate| {
                delegate.connection_did_fail_to_open(ClientError::InvalidState);
            });
            return;
        }
        debug!(url = %self.url.lock(), "Starting connection");
        tokio::spawn(self.start_task());
    }

    fn send(&self, data: Vec<u8>, completion: SendCompletion) {
        if *self.state.lock() != ConnectionState::Connected {
            self.queue.post(move || completion(Err(ClientError::InvalidState)));
            return;
        }
        let transport = self.transport.lock().clone();
        match transport {
            Some(transport) => {
                let queue = self.queue.clone();
                transport.send(
                    data,
                    Box::new(move |result| queue.post(move || completion(result))),
                );
            }
            None => self.queue.post(move || completion(Err(ClientError::InvalidState))),
        }
    }

    fn stop(self: Arc<Self>, error: Option<ClientError>) {
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Stopped => {
                    debug!("Stop ignored, already stopped");
                    return;
                }
                ConnectionState::Initial => {
                    debug!("Stop ignored, connection never started");
                    return;
                }
                _ => {}
            }
            *self.stop_error.lock() = error.clone();
            *state = ConnectionState::Stopped;
        }

        info!("Stopping connection");
        tokio::spawn(async move {
            // Let any in-flight start settle before touching the transport.
            self.start_gate.cancelled().await;
            let transport = self.transport.lock().clone();
            match transport {
                Some(transport) => transport.close(),
                None => {
                    self.stop_error.lock().take();
                    self.post_delegate(move |delegate| delegate.connection_did_close(error));
                }
            }
        });
    }

    fn set_delegate(&self, delegate: Weak<dyn ConnectionDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    fn connection_id(&self) -> Option<String> {
        self.connection_id.lock().clone()
    }

    fn inherent_keep_alive(&self) -> bool {
        self.transport
            .lock()
            .as_ref()
            .is_some_and(|transport| transport.inherent_keep_alive())
    }
}

impl TransportDelegate for HttpConnection {
    fn transport_did_open(&self) {
        if self
            .change_state(Some(ConnectionState::Connecting), ConnectionState::Connected)
            .is_some()
        {
            let connection_id = self.pending_connection_id.lock().take();
            *self.connection_id.lock() = connection_id.clone();
            self.start_gate.cancel();
            info!(connection_id = ?connection_id, "Connection opened");
            self.post_delegate(move |delegate| delegate.connection_did_open(connection_id));
        } else {
            debug!("Transport opened after stop, closing it");
            self.start_gate.cancel();
            if let Some(transport) = self.transport.lock().clone() {
                transport.close();
            }
        }
    }

    fn transport_did_receive_data(&self, data: Vec<u8>) {
        self.post_delegate(move |delegate| delegate.connection_did_receive_data(data));
    }

    fn transport_did_close(&self, error: Option<ClientError>) {
        let previous = self.change_state(None, ConnectionState::Stopped);
        let effective = self.stop_error.lock().take().or(error);

        if previous == Some(ConnectionState::Connecting) {
            let error = effective.unwrap_or_else(|| {
                ClientError::Transport("transport closed while connecting".into())
            });
            warn!(error = %error, "Transport closed while connecting");
            self.start_gate.cancel();
            self.post_delegate(move |delegate| delegate.connection_did_fail_to_open(error));
        } else {
            *self.connection_id.lock() = None;
            info!(error = ?effective, "Connection closed");
            self.post_delegate(move |delegate| delegate.connection_did_close(effective));
        }
    }
}
