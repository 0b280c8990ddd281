//! The hub connection: invocation tracking, client-method dispatch,
//! keep-alive, and the inbound demultiplexer.

use std::collections::HashMap;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use hublink_core::protocol::{handshake, CancelInvocationMessage, InvocationMessage};
use hublink_core::{
    ArgumentExtractor, CallbackQueue, ClientError, ClientResult, Connection, ConnectionDelegate,
    HttpConnectionOptions, HubMessage, HubProtocol, JsonHubProtocol, ReconnectPolicy,
};

use super::invocation::{
    ItemDisposition, PendingCalls, SingleResultHandler, StreamResultHandler,
};
use super::{HubConnectionDelegate, MethodHandler, StreamHandle};
use crate::http_connection::HttpConnection;
use crate::reconnectable::ReconnectableConnection;

/// Where the hub handshake stands for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStatus {
    /// The next inbound frame starts with a handshake response.
    NeedsHandling {
        /// Whether this session is the product of a reconnect.
        reconnect: bool,
    },
    /// Handshake acknowledged; ordinary hub messages flow.
    Handled,
}

/// A bidirectional RPC connection to a hub.
///
/// Sits on any [`Connection`] and turns it into typed remote procedure
/// calls: request/response via [`invoke`](Self::invoke), server-push
/// streams via [`stream`](Self::stream), fire-and-forget sends, and
/// client-bound method dispatch via [`on`](Self::on).
pub struct HubConnection {
    me: Weak<HubConnection>,
    connection: Arc<dyn Connection>,
    protocol: Arc<dyn HubProtocol>,
    keep_alive_interval: Option<std::time::Duration>,
    queue: CallbackQueue,
    next_invocation_id: AtomicU64,
    pending: PendingCalls,
    methods: Mutex<HashMap<String, MethodHandler>>,
    handshake: Mutex<HandshakeStatus>,
    keep_alive: Mutex<Option<CancellationToken>>,
    delegate: Mutex<Option<Weak<dyn HubConnectionDelegate>>>,
}

impl HubConnection {
    /// Creates a hub connection over an existing connection and protocol,
    /// wiring itself up as the connection's delegate.
    pub fn new(
        connection: Arc<dyn Connection>,
        protocol: Arc<dyn HubProtocol>,
        options: &HttpConnectionOptions,
    ) -> Arc<Self> {
        let hub = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connection: connection.clone(),
            protocol,
            keep_alive_interval: options.keep_alive_interval,
            queue: options.callback_queue.clone(),
            next_invocation_id: AtomicU64::new(1),
            pending: PendingCalls::new(),
            methods: Mutex::new(HashMap::new()),
            handshake: Mutex::new(HandshakeStatus::NeedsHandling { reconnect: false }),
            keep_alive: Mutex::new(None),
            delegate: Mutex::new(None),
        });
        let delegate: Arc<dyn ConnectionDelegate> = hub.clone();
        connection.set_delegate(Arc::downgrade(&delegate));
        hub
    }

    /// Creates a hub connection speaking the JSON protocol over a
    /// reconnecting WebSocket connection to `url`.
    pub fn with_url(
        url: Url,
        options: HttpConnectionOptions,
        policy: Arc<dyn ReconnectPolicy>,
    ) -> Arc<Self> {
        let queue = options.callback_queue.clone();
        let factory_url = url;
        let factory_options = options.clone();
        let connection = ReconnectableConnection::new(
            move || -> Arc<dyn Connection> {
                HttpConnection::new(factory_url.clone(), factory_options.clone())
            },
            policy,
            queue,
        );
        Self::new(connection, Arc::new(JsonHubProtocol::new()), &options)
    }

    /// Installs the delegate receiving lifecycle events.
    pub fn set_delegate(&self, delegate: Weak<dyn HubConnectionDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    /// Begins opening the connection; the outcome arrives on the delegate.
    pub fn start(&self) {
        info!("Starting hub connection");
        *self.handshake.lock() = HandshakeStatus::NeedsHandling { reconnect: false };
        self.connection.clone().start();
    }

    /// Tears the connection down.
    pub fn stop(&self) {
        info!("Stopping hub connection");
        self.connection.clone().stop(None);
    }

    /// The server-assigned connection ID, once connected.
    pub fn connection_id(&self) -> Option<String> {
        self.connection.connection_id()
    }

    /// Registers a handler for a client-bound method. Registering the same
    /// method again silently replaces the previous handler.
    pub fn on(
        &self,
        method: impl Into<String>,
        handler: impl Fn(ArgumentExtractor) -> ClientResult<()> + Send + Sync + 'static,
    ) {
        let method = method.into();
        if self
            .methods
            .lock()
            .insert(method.clone(), Arc::new(handler))
            .is_some()
        {
            warn!(method = %method, "Replacing an existing client method handler");
        }
    }

    /// Invokes a hub method without tracking a response.
    pub fn send(
        &self,
        method: &str,
        arguments: Vec<Value>,
        completion: impl FnOnce(ClientResult<()>) + Send + 'static,
    ) {
        if let Err(e) = self.ensure_established() {
            self.queue.post(move || completion(Err(e)));
            return;
        }
        let message = HubMessage::Invocation(InvocationMessage {
            invocation_id: None,
            target: method.into(),
            arguments,
        });
        let bytes = match self.protocol.write_message(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.queue.post(move || completion(Err(e)));
                return;
            }
        };
        debug!(method, "Sending fire-and-forget invocation");
        let me = self.me.clone();
        self.connection.send(
            bytes,
            Box::new(move |result| {
                if result.is_ok()
                    && let Some(hub) = me.upgrade()
                {
                    hub.reset_keep_alive();
                }
                completion(result);
            }),
        );
    }

    /// Invokes a hub method and decodes its single result as `T`.
    ///
    /// The completion is invoked exactly once: with the decoded result,
    /// with the server-reported error, with a local write failure, or with
    /// the close error if the connection dies first.
    pub fn invoke<T>(
        &self,
        method: &str,
        arguments: Vec<Value>,
        completion: impl FnOnce(ClientResult<T>) + Send + 'static,
    ) where
        T: DeserializeOwned + Send + 'static,
    {
        if let Err(e) = self.ensure_established() {
            self.queue.post(move || completion(Err(e)));
            return;
        }
        let invocation_id = self.allocate_invocation_id();
        self.pending.insert(
            invocation_id.clone(),
            Box::new(SingleResultHandler::new(self.queue.clone(), completion)),
        );
        let message = HubMessage::Invocation(InvocationMessage {
            invocation_id: Some(invocation_id.clone()),
            target: method.into(),
            arguments,
        });
        debug!(method, invocation_id = %invocation_id, "Invoking hub method");
        self.write_tracked(message, invocation_id);
    }

    /// Starts a streaming invocation. Items arrive through
    /// `item_callback`; `completion` fires exactly once when the stream
    /// ends, with the error that ended it, if any.
    ///
    /// The returned handle cancels the stream through
    /// [`cancel_stream_invocation`](Self::cancel_stream_invocation).
    pub fn stream<T>(
        &self,
        method: &str,
        arguments: Vec<Value>,
        item_callback: impl Fn(T) + Send + Sync + 'static,
        completion: impl FnOnce(Option<ClientError>) + Send + 'static,
    ) -> StreamHandle
    where
        T: DeserializeOwned + Send + 'static,
    {
        if let Err(e) = self.ensure_established() {
            self.queue.post(move || completion(Some(e)));
            return StreamHandle::from_raw("");
        }
        let invocation_id = self.allocate_invocation_id();
        self.pending.insert(
            invocation_id.clone(),
            Box::new(StreamResultHandler::new(
                self.queue.clone(),
                item_callback,
                completion,
            )),
        );
        let message = HubMessage::StreamInvocation(InvocationMessage {
            invocation_id: Some(invocation_id.clone()),
            target: method.into(),
            arguments,
        });
        debug!(method, invocation_id = %invocation_id, "Starting streaming invocation");
        self.write_tracked(message, invocation_id.clone());
        StreamHandle::from_raw(invocation_id)
    }

    /// Asks the server to stop a streaming invocation. `error_callback`
    /// fires only on failure; the stream's own completion still arrives
    /// from the server.
    pub fn cancel_stream_invocation(
        &self,
        handle: &StreamHandle,
        error_callback: impl FnOnce(ClientError) + Send + 'static,
    ) {
        if handle.invocation_id().is_empty() {
            self.queue.post(move || {
                error_callback(ClientError::InvalidOperation("invalid stream handle".into()));
            });
            return;
        }
        if let Err(e) = self.ensure_established() {
            self.queue.post(move || error_callback(e));
            return;
        }
        let message = HubMessage::CancelInvocation(CancelInvocationMessage {
            invocation_id: handle.invocation_id().to_string(),
        });
        let bytes = match self.protocol.write_message(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.queue.post(move || error_callback(e));
                return;
            }
        };
        debug!(invocation_id = %handle.invocation_id(), "Cancelling streaming invocation");
        let me = self.me.clone();
        let queue = self.queue.clone();
        self.connection.send(
            bytes,
            Box::new(move |result| match result {
                Ok(()) => {
                    if let Some(hub) = me.upgrade() {
                        hub.reset_keep_alive();
                    }
                }
                Err(e) => queue.post(move || error_callback(e)),
            }),
        );
    }

    fn ensure_established(&self) -> ClientResult<()> {
        if *self.handshake.lock() == HandshakeStatus::Handled {
            Ok(())
        } else {
            Err(ClientError::InvalidOperation(
                "hub connection is not established".into(),
            ))
        }
    }

    fn allocate_invocation_id(&self) -> String {
        self.next_invocation_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Writes a message whose outcome is owed to a registered handler: a
    /// write failure pops the handler and fails it, a success resets the
    /// keep-alive clock.
    fn write_tracked(&self, message: HubMessage, invocation_id: String) {
        let bytes = match self.protocol.write_message(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Some(handler) = self.pending.remove(&invocation_id) {
                    handler.raise_error(e);
                }
                return;
            }
        };
        let me = self.me.clone();
        self.connection.send(
            bytes,
            Box::new(move |result| {
                let Some(hub) = me.upgrade() else { return };
                match result {
                    Ok(()) => hub.reset_keep_alive(),
                    Err(e) => {
                        if let Some(handler) = hub.pending.remove(&invocation_id) {
                            handler.raise_error(e);
                        }
                    }
                }
            }),
        );
    }

    fn post_delegate(&self, notify: impl FnOnce(Arc<dyn HubConnectionDelegate>) + Send + 'static) {
        let delegate = self.delegate.lock().clone();
        self.queue.post(move || {
            if let Some(delegate) = delegate.and_then(|weak| weak.upgrade()) {
                notify(delegate);
            }
        });
    }

    // ------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------

    fn initiate_handshake(&self) {
        let reconnect = matches!(
            *self.handshake.lock(),
            HandshakeStatus::NeedsHandling { reconnect: true }
        );
        let request = match handshake::create_request(self.protocol.name(), self.protocol.version())
        {
            Ok(request) => request,
            Err(e) => {
                self.handshake_send_failed(e, reconnect);
                return;
            }
        };
        debug!(
            protocol = self.protocol.name(),
            version = self.protocol.version(),
            reconnect,
            "Sending handshake request"
        );
        let me = self.me.clone();
        self.connection.send(
            request,
            Box::new(move |result| {
                if let Err(e) = result
                    && let Some(hub) = me.upgrade()
                {
                    hub.handshake_send_failed(e, reconnect);
                }
            }),
        );
    }

    fn handshake_send_failed(&self, error: ClientError, reconnect: bool) {
        if reconnect {
            // The delegate already saw this session open once; route the
            // failure through the close path and let the retry policy
            // decide what happens next.
            error!(error = %error, "Handshake send failed after reconnect");
            self.connection.clone().stop(Some(error));
        } else {
            warn!(error = %error, "Handshake send failed");
            self.post_delegate(move |delegate| delegate.did_fail_to_open(error));
        }
    }

    // ------------------------------------------------------------------
    // Inbound demultiplexer
    // ------------------------------------------------------------------

    fn process_frame(&self, data: Vec<u8>) {
        let mut payload = data;
        let status = *self.handshake.lock();
        if let HandshakeStatus::NeedsHandling { reconnect } = status {
            match handshake::parse_response(&payload) {
                Err(e) => {
                    warn!(error = %e, "Handshake response could not be parsed");
                    self.post_delegate(move |delegate| delegate.did_fail_to_open(e));
                    return;
                }
                Ok((response, rest)) => {
                    if let Some(message) = response.error {
                        let error = ClientError::Handshake(message);
                        warn!(error = %error, "Server rejected the handshake");
                        self.post_delegate(move |delegate| delegate.did_fail_to_open(error));
                        return;
                    }
                    debug!("Handshake completed");
                    *self.handshake.lock() = HandshakeStatus::Handled;
                    self.reset_keep_alive();
                    if reconnect {
                        self.post_delegate(|delegate| delegate.did_reconnect());
                    } else {
                        self.post_delegate(|delegate| delegate.did_open());
                    }
                    payload = rest;
                }
            }
        }

        if payload.is_empty() {
            return;
        }
        match self.protocol.parse_messages(&payload) {
            // A malformed frame never tears the connection down.
            Err(e) => warn!(error = %e, "Discarding an unparseable frame"),
            Ok(messages) => {
                for message in messages {
                    self.dispatch_message(message);
                }
            }
        }
    }

    fn dispatch_message(&self, message: HubMessage) {
        match message {
            HubMessage::Completion(completion) => {
                match self.pending.remove(&completion.invocation_id) {
                    Some(handler) => handler.process_completion(completion),
                    None => {
                        warn!(
                            invocation_id = %completion.invocation_id,
                            "Completion for an unknown invocation"
                        );
                    }
                }
            }
            HubMessage::StreamItem(item) => {
                match self.pending.process_item(&item.invocation_id, item.item) {
                    ItemDisposition::Delivered => {}
                    ItemDisposition::Unknown => {
                        warn!(
                            invocation_id = %item.invocation_id,
                            "Stream item for an unknown invocation"
                        );
                    }
                    ItemDisposition::Failed(handler, error) => handler.raise_error(error),
                }
            }
            HubMessage::Invocation(invocation) => self.dispatch_client_invocation(invocation),
            HubMessage::Close(close) => {
                info!(error = ?close.error, "Server requested close");
                self.connection
                    .clone()
                    .stop(Some(ClientError::ServerClose(close.error)));
            }
            HubMessage::Ping => trace!("Received ping"),
            other => {
                debug!(message_type = other.message_type(), "Ignoring unexpected message");
            }
        }
    }

    fn dispatch_client_invocation(&self, invocation: InvocationMessage) {
        let handler = self.methods.lock().get(&invocation.target).cloned();
        let Some(handler) = handler else {
            warn!(target = %invocation.target, "No client method handler registered");
            return;
        };
        let target = invocation.target;
        let extractor = ArgumentExtractor::new(invocation.arguments);
        self.queue.post(move || {
            if let Err(e) = handler(extractor) {
                // Handler failures are logged, never propagated.
                error!(target = %target, error = %e, "Client method handler failed");
            }
        });
    }

    // ------------------------------------------------------------------
    // Keep-alive
    // ------------------------------------------------------------------

    /// Schedules the next keep-alive ping, replacing any pending one.
    /// Called after handshake completion and after every successful write.
    fn reset_keep_alive(&self) {
        let Some(interval) = self.keep_alive_interval else {
            return;
        };
        if self.connection.inherent_keep_alive() {
            return;
        }
        if *self.handshake.lock() != HandshakeStatus::Handled {
            return;
        }

        let token = CancellationToken::new();
        {
            let mut guard = self.keep_alive.lock();
            if let Some(previous) = guard.take() {
                previous.cancel();
            }
            *guard = Some(token.clone());
        }

        let me = self.me.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(interval) => {
                    if let Some(hub) = me.upgrade() {
                        hub.fire_keep_alive();
                    }
                }
            }
        });
    }

    fn fire_keep_alive(&self) {
        let bytes = match self.protocol.write_message(&HubMessage::Ping) {
            Ok(bytes) => bytes,
            Err(e) => {
                // The timer stays cancelled until the next successful send
                // reinstalls it.
                error!(error = %e, "Failed to serialize the keep-alive ping");
                if let Some(token) = self.keep_alive.lock().as_ref() {
                    token.cancel();
                }
                return;
            }
        };
        trace!("Sending keep-alive ping");
        let me = self.me.clone();
        self.connection.send(
            bytes,
            Box::new(move |result| match result {
                Ok(()) => {
                    if let Some(hub) = me.upgrade() {
                        hub.reset_keep_alive();
                    }
                }
                // Ping failures never close the connection; the transport
                // reports its own death separately.
                Err(e) => warn!(error = %e, "Keep-alive ping failed"),
            }),
        );
    }

    fn clean_up_keep_alive(&self) {
        let mut guard = self.keep_alive.lock();
        if let Some(token) = guard.take() {
            token.cancel();
        }
    }
}

impl ConnectionDelegate for HubConnection {
    fn connection_did_open(&self, connection_id: Option<String>) {
        debug!(connection_id = ?connection_id, "Connection opened, negotiating hub protocol");
        self.initiate_handshake();
    }

    fn connection_did_fail_to_open(&self, error: ClientError) {
        self.post_delegate(move |delegate| delegate.did_fail_to_open(error));
    }

    fn connection_did_receive_data(&self, data: Vec<u8>) {
        self.process_frame(data);
    }

    fn connection_did_close(&self, error: Option<ClientError>) {
        info!(error = ?error, "Hub connection closed");
        self.clean_up_keep_alive();
        let cause = error.clone().unwrap_or(ClientError::InvocationCancelled);
        for handler in self.pending.drain() {
            handler.raise_error(cause.clone());
        }
        *self.handshake.lock() = HandshakeStatus::NeedsHandling { reconnect: false };
        self.post_delegate(move |delegate| delegate.did_close(error));
    }

    fn connection_will_reconnect(&self, error: ClientError) {
        warn!(error = %error, "Hub connection will reconnect");
        *self.handshake.lock() = HandshakeStatus::NeedsHandling { reconnect: true };
        self.post_delegate(move |delegate| delegate.will_reconnect(error));
    }

    fn connection_did_reconnect(&self) {
        debug!("Connection reconnected, renegotiating hub protocol");
        self.initiate_handshake();
    }
}
