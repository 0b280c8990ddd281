//! Pending-call tracking for server invocations.
//!
//! Every outbound invocation registers a handler under its invocation ID
//! before the frame is written, so a response racing the write can never
//! miss its waiter. Handlers leave the registry on completion, on a local
//! write failure, or when the connection closes; each delivers its user
//! callback exactly once, always through the callback queue.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use hublink_core::protocol::CompletionMessage;
use hublink_core::{CallbackQueue, ClientError, ClientResult};

/// A registered waiter for invocation responses.
pub(crate) trait InvocationHandler: Send {
    /// Feeds one stream item. A returned error means the handler cannot
    /// consume items; the caller removes it and raises the error.
    fn process_stream_item(&mut self, item: Value) -> Option<ClientError>;

    /// Consumes the terminal completion message.
    fn process_completion(self: Box<Self>, completion: CompletionMessage);

    /// Fails the invocation locally (write failure or connection close).
    fn raise_error(self: Box<Self>, error: ClientError);
}

/// Handler for a single-result invocation: decodes one value of the
/// declared type from the completion.
pub(crate) struct SingleResultHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: FnOnce(ClientResult<T>) + Send + 'static,
{
    queue: CallbackQueue,
    completion: F,
    _result: PhantomData<fn(T)>,
}

impl<T, F> SingleResultHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: FnOnce(ClientResult<T>) + Send + 'static,
{
    pub(crate) fn new(queue: CallbackQueue, completion: F) -> Self {
        Self {
            queue,
            completion,
            _result: PhantomData,
        }
    }
}

impl<T, F> InvocationHandler for SingleResultHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: FnOnce(ClientResult<T>) + Send + 'static,
{
    fn process_stream_item(&mut self, _item: Value) -> Option<ClientError> {
        Some(ClientError::Protocol(
            "stream item received for a non-streaming invocation".into(),
        ))
    }

    fn process_completion(self: Box<Self>, completion: CompletionMessage) {
        let Self { queue, completion: callback, .. } = *self;
        let outcome = match completion.error {
            Some(error) => Err(ClientError::InvocationFailed(error)),
            // An absent result decodes as null, letting `()` and optional
            // result types succeed while a concrete type mismatch fails.
            None => serde_json::from_value(completion.result.unwrap_or(Value::Null))
                .map_err(ClientError::from),
        };
        queue.post(move || callback(outcome));
    }

    fn raise_error(self: Box<Self>, error: ClientError) {
        let Self { queue, completion: callback, .. } = *self;
        queue.post(move || callback(Err(error)));
    }
}

/// Handler for a streaming invocation: zero or more items, then exactly
/// one completion.
pub(crate) struct StreamResultHandler<T, I, D>
where
    T: DeserializeOwned + Send + 'static,
    I: Fn(T) + Send + Sync + 'static,
    D: FnOnce(Option<ClientError>) + Send + 'static,
{
    queue: CallbackQueue,
    item_callback: Arc<I>,
    done: D,
    _item: PhantomData<fn(T)>,
}

impl<T, I, D> StreamResultHandler<T, I, D>
where
    T: DeserializeOwned + Send + 'static,
    I: Fn(T) + Send + Sync + 'static,
    D: FnOnce(Option<ClientError>) + Send + 'static,
{
    pub(crate) fn new(queue: CallbackQueue, item_callback: I, done: D) -> Self {
        Self {
            queue,
            item_callback: Arc::new(item_callback),
            done,
            _item: PhantomData,
        }
    }
}

impl<T, I, D> InvocationHandler for StreamResultHandler<T, I, D>
where
    T: DeserializeOwned + Send + 'static,
    I: Fn(T) + Send + Sync + 'static,
    D: FnOnce(Option<ClientError>) + Send + 'static,
{
    fn process_stream_item(&mut self, item: Value) -> Option<ClientError> {
        match serde_json::from_value::<T>(item) {
            Ok(item) => {
                let callback = self.item_callback.clone();
                self.queue.post(move || callback(item));
                None
            }
            Err(e) => Some(ClientError::from(e)),
        }
    }

    fn process_completion(self: Box<Self>, completion: CompletionMessage) {
        let Self { queue, done, .. } = *self;
        let error = completion.error.map(ClientError::InvocationFailed);
        queue.post(move || done(error));
    }

    fn raise_error(self: Box<Self>, error: ClientError) {
        let Self { queue, done, .. } = *self;
        queue.post(move || done(Some(error)));
    }
}

/// Outcome of feeding a stream item to the registry.
pub(crate) enum ItemDisposition {
    /// The handler accepted the item.
    Delivered,
    /// No handler is registered under that ID.
    Unknown,
    /// The handler rejected the item and was removed.
    Failed(Box<dyn InvocationHandler>, ClientError),
}

/// The pending-call registry: invocation ID to handler.
#[derive(Default)]
pub(crate) struct PendingCalls {
    calls: Mutex<HashMap<String, Box<dyn InvocationHandler>>>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `invocation_id`.
    pub(crate) fn insert(&self, invocation_id: String, handler: Box<dyn InvocationHandler>) {
        if self.calls.lock().insert(invocation_id.clone(), handler).is_some() {
            // IDs are monotonic, so this indicates a caller bug.
            warn!(invocation_id = %invocation_id, "Replaced a pending invocation handler");
        }
    }

    /// Removes and returns the handler under `invocation_id`.
    pub(crate) fn remove(&self, invocation_id: &str) -> Option<Box<dyn InvocationHandler>> {
        self.calls.lock().remove(invocation_id)
    }

    /// Feeds a stream item to the handler under `invocation_id` without
    /// removing it; a failing handler is removed and returned.
    pub(crate) fn process_item(&self, invocation_id: &str, item: Value) -> ItemDisposition {
        let mut calls = self.calls.lock();
        let Some(handler) = calls.get_mut(invocation_id) else {
            return ItemDisposition::Unknown;
        };
        match handler.process_stream_item(item) {
            None => ItemDisposition::Delivered,
            Some(error) => match calls.remove(invocation_id) {
                Some(handler) => ItemDisposition::Failed(handler, error),
                None => {
                    warn!(invocation_id = %invocation_id, "Failing handler already removed");
                    ItemDisposition::Unknown
                }
            },
        }
    }

    /// Removes and returns every registered handler.
    pub(crate) fn drain(&self) -> Vec<Box<dyn InvocationHandler>> {
        self.calls.lock().drain().map(|(_, handler)| handler).collect()
    }
}
