//! Reconnecting wrapper over a factory of single-attempt connections.
//!
//! Presents the same [`Connection`] surface as the connection it wraps but
//! hides transient disconnects behind a [`ReconnectPolicy`]: when the
//! underlying connection drops while running, a fresh one is created after
//! the policy-supplied delay. The owner additionally observes
//! `connection_will_reconnect`, `connection_did_reconnect`, and
//! `connection_reconnect_attempt` notifications.

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hublink_core::{
    CallbackQueue, ClientError, Connection, ConnectionDelegate, ReconnectPolicy, RetryContext,
    SendCompletion,
};

/// Lifecycle states of a reconnectable connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectableState {
    /// No connection and no episode in progress.
    Disconnected,
    /// First open of a session in progress.
    Starting,
    /// A reconnect episode is in progress.
    Reconnecting,
    /// Connected and usable.
    Running,
    /// Teardown requested; waiting for the underlying close.
    Stopping,
}

struct Inner {
    state: ReconnectableState,
    underlying: Option<Arc<dyn Connection>>,
    /// Attempts that failed in the current episode.
    failed_attempts: u32,
    /// Start of the current episode; cleared on open and on fresh start.
    episode_start: Option<Instant>,
    /// Cancels a scheduled restart. Taken and cancelled when stopping.
    restart_token: Option<CancellationToken>,
}

/// A [`Connection`] that survives transient drops by recreating its
/// underlying connection.
pub struct ReconnectableConnection {
    factory: Box<dyn Fn() -> Arc<dyn Connection> + Send + Sync>,
    policy: Arc<dyn ReconnectPolicy>,
    queue: CallbackQueue,
    inner: Mutex<Inner>,
    delegate: Mutex<Option<Weak<dyn ConnectionDelegate>>>,
    self_ref: Mutex<Weak<Self>>,
}

enum CloseAction {
    Restart(ClientError),
    Forward(Option<ClientError>),
    Ignore,
}

enum RestartAction {
    GiveUp { was_starting: bool },
    Schedule { interval: std::time::Duration, attempt: u32, first: bool, token: CancellationToken },
}

impl ReconnectableConnection {
    /// Creates a reconnectable connection over `factory`, consulting
    /// `policy` after every failure.
    pub fn new(
        factory: impl Fn() -> Arc<dyn Connection> + Send + Sync + 'static,
        policy: Arc<dyn ReconnectPolicy>,
        queue: CallbackQueue,
    ) -> Arc<Self> {
        let connection = Arc::new(Self {
            factory: Box::new(factory),
            policy,
            queue,
            inner: Mutex::new(Inner {
                state: ReconnectableState::Disconnected,
                underlying: None,
                failed_attempts: 0,
                episode_start: None,
                restart_token: None,
            }),
            delegate: Mutex::new(None),
            self_ref: Mutex::new(Weak::new()),
        });
        *connection.self_ref.lock() = Arc::downgrade(&connection);
        connection
    }

    /// Upgrades the connection's own weak self-reference, for use from
    /// `&self` contexts (e.g. [`ConnectionDelegate`] callbacks) that need
    /// an `Arc<Self>` to hand off to [`Self::handle_restart`].
    fn arc(&self) -> Arc<Self> {
        self.self_ref
            .lock()
            .upgrade()
            .expect("ReconnectableConnection is always held behind an Arc")
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReconnectableState {
        self.inner.lock().state
    }

    fn post_delegate(&self, notify: impl FnOnce(Arc<dyn ConnectionDelegate>) + Send + 'static) {
        let delegate = self.delegate.lock().clone();
        self.queue.post(move || {
            if let Some(delegate) = delegate.and_then(|weak| weak.upgrade()) {
                notify(delegate);
            }
        });
    }

    fn start_internal(self: &Arc<Self>) {
        let connection = (self.factory)();
        let delegate: Arc<dyn ConnectionDelegate> = self.clone();
        connection.set_delegate(Arc::downgrade(&delegate));

        let proceed = {
            let mut inner = self.inner.lock();
            match inner.state {
                ReconnectableState::Starting | ReconnectableState::Reconnecting => {
                    inner.underlying = Some(connection.clone());
                    inner.restart_token = None;
                    true
                }
                _ => false,
            }
        };
        if proceed {
            connection.start();
        } else {
            debug!("Restart abandoned, connection is no longer starting");
        }
    }

    /// Consults the policy and either schedules the next attempt or gives
    /// the episode up.
    fn handle_restart(self: &Arc<Self>, error: ClientError) {
        let action = {
            let mut inner = self.inner.lock();
            match inner.state {
                ReconnectableState::Starting | ReconnectableState::Reconnecting => {}
                _ => return,
            }

            // The episode clock starts with the first failure and is kept
            // for all of the episode's attempts.
            let episode_start = match inner.episode_start {
                Some(start) => start,
                None => {
                    let now = Instant::now();
                    inner.episode_start = Some(now);
                    now
                }
            };
            let context = RetryContext {
                failed_attempts_count: inner.failed_attempts,
                reconnect_start_time: episode_start,
                error: error.clone(),
            };

            match self.policy.next_attempt_interval(&context) {
                None => {
                    let was_starting = inner.state == ReconnectableState::Starting;
                    inner.state = ReconnectableState::Disconnected;
                    inner.underlying = None;
                    RestartAction::GiveUp { was_starting }
                }
                Some(interval) => {
                    let first = inner.state == ReconnectableState::Reconnecting
                        && inner.failed_attempts == 0;
                    let attempt = inner.failed_attempts;
                    inner.failed_attempts += 1;
                    let token = CancellationToken::new();
                    inner.restart_token = Some(token.clone());
                    RestartAction::Schedule { interval, attempt, first, token }
                }
            }
        };

        match action {
            RestartAction::GiveUp { was_starting } => {
                warn!(error = %error, "Giving up on reconnecting");
                if was_starting {
                    self.post_delegate(move |delegate| delegate.connection_did_fail_to_open(error));
                } else {
                    self.post_delegate(move |delegate| {
                        delegate.connection_did_close(Some(error));
                    });
                }
            }
            RestartAction::Schedule { interval, attempt, first, token } => {
                if first {
                    let error = error.clone();
                    self.post_delegate(move |delegate| delegate.connection_will_reconnect(error));
                }
                self.post_delegate(move |delegate| delegate.connection_reconnect_attempt(attempt));
                debug!(attempt, delay = ?interval, "Scheduling restart");

                let connection = self.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => debug!("Scheduled restart cancelled"),
                        _ = tokio::time::sleep(interval) => connection.start_internal(),
                    }
                });
            }
        }
    }
}

impl Connection for ReconnectableConnection {
    fn start(self: Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.state != ReconnectableState::Disconnected {
                warn!(state = ?inner.state, "Start ignored, connection is not disconnected");
                return;
            }
            inner.state = ReconnectableState::Starting;
            inner.failed_attempts = 0;
            inner.episode_start = None;
        }
        info!("Starting reconnectable connection");
        self.start_internal();
    }

    fn send(&self, data: Vec<u8>, completion: SendCompletion) {
        let (state, underlying) = {
            let inner = self.inner.lock();
            (inner.state, inner.underlying.clone())
        };
        if state == ReconnectableState::Reconnecting {
            self.queue
                .post(move || completion(Err(ClientError::ConnectionIsReconnecting)));
            return;
        }
        match underlying {
            Some(connection) => connection.send(data, completion),
            None => self
                .queue
                .post(move || completion(Err(ClientError::InvalidState))),
        }
    }

    fn stop(self: Arc<Self>, error: Option<ClientError>) {
        enum StopAction {
            Ignore,
            CloseUnderlying(Arc<dyn Connection>),
            ReportDirectly,
        }

        let action = {
            let mut inner = self.inner.lock();
            match inner.state {
                ReconnectableState::Starting
                | ReconnectableState::Reconnecting
                | ReconnectableState::Running => {
                    inner.state = ReconnectableState::Stopping;
                    // A pending restart timer is cancelled under the same
                    // lock that moved us to Stopping, so it cannot fire a
                    // new attempt afterwards.
                    let timer = inner.restart_token.take();
                    let timer_was_pending = timer.is_some();
                    if let Some(token) = timer {
                        token.cancel();
                    }
                    match (timer_was_pending, inner.underlying.clone()) {
                        (false, Some(connection)) => StopAction::CloseUnderlying(connection),
                        _ => {
                            inner.state = ReconnectableState::Disconnected;
                            inner.underlying = None;
                            StopAction::ReportDirectly
                        }
                    }
                }
                _ => {
                    warn!(state = ?inner.state, "Stop ignored");
                    StopAction::Ignore
                }
            }
        };

        match action {
            StopAction::Ignore => {}
            StopAction::CloseUnderlying(connection) => {
                info!("Stopping reconnectable connection");
                connection.stop(error);
            }
            StopAction::ReportDirectly => {
                info!("Stopping reconnectable connection, no live attempt to close");
                self.post_delegate(move |delegate| delegate.connection_did_close(error));
            }
        }
    }

    fn set_delegate(&self, delegate: Weak<dyn ConnectionDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    fn connection_id(&self) -> Option<String> {
        let underlying = self.inner.lock().underlying.clone();
        underlying.and_then(|connection| connection.connection_id())
    }

    fn inherent_keep_alive(&self) -> bool {
        let underlying = self.inner.lock().underlying.clone();
        underlying.is_some_and(|connection| connection.inherent_keep_alive())
    }
}

impl ConnectionDelegate for ReconnectableConnection {
    fn connection_did_open(&self, connection_id: Option<String>) {
        enum OpenAction {
            Open,
            Reconnected,
            Abort(Option<Arc<dyn Connection>>),
        }

        let action = {
            let mut inner = self.inner.lock();
            match inner.state {
                ReconnectableState::Starting => {
                    inner.state = ReconnectableState::Running;
                    inner.failed_attempts = 0;
                    inner.episode_start = None;
                    OpenAction::Open
                }
                ReconnectableState::Reconnecting => {
                    inner.state = ReconnectableState::Running;
                    inner.failed_attempts = 0;
                    inner.episode_start = None;
                    OpenAction::Reconnected
                }
                _ => OpenAction::Abort(inner.underlying.clone()),
            }
        };

        match action {
            OpenAction::Open => {
                info!(connection_id = ?connection_id, "Reconnectable connection opened");
                self.post_delegate(move |delegate| delegate.connection_did_open(connection_id));
            }
            OpenAction::Reconnected => {
                info!(connection_id = ?connection_id, "Reconnected");
                self.post_delegate(|delegate| delegate.connection_did_reconnect());
            }
            OpenAction::Abort(underlying) => {
                debug!("Connection opened while stopping, closing it");
                if let Some(connection) = underlying {
                    connection.stop(Some(ClientError::ConnectionIsBeingClosed));
                }
            }
        }
    }

    fn connection_did_fail_to_open(&self, error: ClientError) {
        let action = {
            let mut inner = self.inner.lock();
            match inner.state {
                ReconnectableState::Starting | ReconnectableState::Reconnecting => {
                    CloseAction::Restart(error)
                }
                ReconnectableState::Stopping => {
                    inner.state = ReconnectableState::Disconnected;
                    inner.underlying = None;
                    CloseAction::Forward(Some(error))
                }
                _ => CloseAction::Ignore,
            }
        };

        match action {
            CloseAction::Restart(error) => {
                warn!(error = %error, "Attempt failed to open");
                self.arc().handle_restart(error);
            }
            CloseAction::Forward(error) => {
                self.post_delegate(move |delegate| delegate.connection_did_close(error));
            }
            CloseAction::Ignore => {}
        }
    }

    fn connection_did_receive_data(&self, data: Vec<u8>) {
        self.post_delegate(move |delegate| delegate.connection_did_receive_data(data));
    }

    fn connection_did_close(&self, error: Option<ClientError>) {
        let action = {
            let mut inner = self.inner.lock();
            match inner.state {
                ReconnectableState::Running => {
                    inner.state = ReconnectableState::Reconnecting;
                    inner.underlying = None;
                    CloseAction::Restart(error.clone().unwrap_or_else(|| {
                        ClientError::Transport("underlying connection closed".into())
                    }))
                }
                ReconnectableState::Disconnected => CloseAction::Ignore,
                _ => {
                    inner.state = ReconnectableState::Disconnected;
                    inner.underlying = None;
                    CloseAction::Forward(error)
                }
            }
        };

        match action {
            CloseAction::Restart(trigger) => {
                warn!(error = %trigger, "Connection lost, starting reconnect episode");
                self.arc().handle_restart(trigger);
            }
            CloseAction::Forward(error) => {
                self.post_delegate(move |delegate| delegate.connection_did_close(error));
            }
            CloseAction::Ignore => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Event {
        Open(Option<String>),
        FailToOpen(ClientError),
        Data(Vec<u8>),
        Close(Option<ClientError>),
        WillReconnect(ClientError),
        Reconnected,
        Attempt(u32),
    }

    struct RecordingDelegate {
        tx: mpsc::UnboundedSender<Event>,
    }

    impl ConnectionDelegate for RecordingDelegate {
        fn connection_did_open(&self, connection_id: Option<String>) {
            let _ = self.tx.send(Event::Open(connection_id));
        }

        fn connection_did_fail_to_open(&self, error: ClientError) {
            let _ = self.tx.send(Event::FailToOpen(error));
        }

        fn connection_did_receive_data(&self, data: Vec<u8>) {
            let _ = self.tx.send(Event::Data(data));
        }

        fn connection_did_close(&self, error: Option<ClientError>) {
            let _ = self.tx.send(Event::Close(error));
        }

        fn connection_will_reconnect(&self, error: ClientError) {
            let _ = self.tx.send(Event::WillReconnect(error));
        }

        fn connection_did_reconnect(&self) {
            let _ = self.tx.send(Event::Reconnected);
        }

        fn connection_reconnect_attempt(&self, attempt: u32) {
            let _ = self.tx.send(Event::Attempt(attempt));
        }
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Open,
        FailToOpen,
    }

    struct MockUnderlying {
        behavior: Behavior,
        delegate: std::sync::Mutex<Option<Weak<dyn ConnectionDelegate>>>,
        sent: std::sync::Mutex<Vec<Vec<u8>>>,
    }

    impl MockUnderlying {
        fn delegate(&self) -> Option<Arc<dyn ConnectionDelegate>> {
            self.delegate.lock().unwrap().as_ref().and_then(Weak::upgrade)
        }

        fn emit_close(&self, error: Option<ClientError>) {
            if let Some(delegate) = self.delegate() {
                delegate.connection_did_close(error);
            }
        }
    }

    impl Connection for MockUnderlying {
        fn start(self: Arc<Self>) {
            match self.behavior {
                Behavior::Open => {
                    if let Some(delegate) = self.delegate() {
                        delegate.connection_did_open(Some("cid".into()));
                    }
                }
                Behavior::FailToOpen => {
                    if let Some(delegate) = self.delegate() {
                        delegate
                            .connection_did_fail_to_open(ClientError::Transport("io".into()));
                    }
                }
            }
        }

        fn send(&self, data: Vec<u8>, completion: SendCompletion) {
            self.sent.lock().unwrap().push(data);
            completion(Ok(()));
        }

        fn stop(self: Arc<Self>, error: Option<ClientError>) {
            self.emit_close(error);
        }

        fn set_delegate(&self, delegate: Weak<dyn ConnectionDelegate>) {
            *self.delegate.lock().unwrap() = Some(delegate);
        }

        fn connection_id(&self) -> Option<String> {
            Some("cid".into())
        }

        fn inherent_keep_alive(&self) -> bool {
            false
        }
    }

    struct Script {
        behaviors: std::sync::Mutex<VecDeque<Behavior>>,
        created: std::sync::Mutex<Vec<Arc<MockUnderlying>>>,
    }

    impl Script {
        fn new(behaviors: Vec<Behavior>) -> Arc<Self> {
            Arc::new(Self {
                behaviors: std::sync::Mutex::new(behaviors.into()),
                created: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn next(&self) -> Arc<MockUnderlying> {
            let behavior = self
                .behaviors
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Behavior::Open);
            let connection = Arc::new(MockUnderlying {
                behavior,
                delegate: std::sync::Mutex::new(None),
                sent: std::sync::Mutex::new(Vec::new()),
            });
            self.created.lock().unwrap().push(connection.clone());
            connection
        }

        fn created(&self, index: usize) -> Arc<MockUnderlying> {
            self.created.lock().unwrap()[index].clone()
        }

        fn created_count(&self) -> usize {
            self.created.lock().unwrap().len()
        }
    }

    struct ScriptedPolicy {
        intervals: Vec<Duration>,
    }

    impl ReconnectPolicy for ScriptedPolicy {
        fn next_attempt_interval(&self, context: &RetryContext) -> Option<Duration> {
            self.intervals.get(context.failed_attempts_count as usize).copied()
        }
    }

    struct Harness {
        connection: Arc<ReconnectableConnection>,
        script: Arc<Script>,
        events: mpsc::UnboundedReceiver<Event>,
        _delegate: Arc<RecordingDelegate>,
    }

    fn harness(behaviors: Vec<Behavior>, intervals: Vec<Duration>) -> Harness {
        let script = Script::new(behaviors);
        let factory_script = script.clone();
        let connection = ReconnectableConnection::new(
            move || -> Arc<dyn Connection> { factory_script.next() },
            Arc::new(ScriptedPolicy { intervals }),
            CallbackQueue::new(),
        );

        let (tx, events) = mpsc::unbounded_channel();
        let delegate = Arc::new(RecordingDelegate { tx });
        let weak: Arc<dyn ConnectionDelegate> = delegate.clone();
        connection.set_delegate(Arc::downgrade(&weak));

        Harness {
            connection,
            script,
            events,
            _delegate: delegate,
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn opens_and_forwards_traffic() {
        let mut h = harness(vec![Behavior::Open], vec![]);

        h.connection.clone().start();
        assert_eq!(next_event(&mut h.events).await, Event::Open(Some("cid".into())));
        assert_eq!(h.connection.state(), ReconnectableState::Running);

        let (tx, mut rx) = mpsc::unbounded_channel();
        h.connection.send(
            b"frame".to_vec(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        assert_eq!(rx.recv().await, Some(Ok(())));
        assert_eq!(
            h.script.created(0).sent.lock().unwrap().as_slice(),
            &[b"frame".to_vec()]
        );

        if let Some(delegate) = h.script.created(0).delegate() {
            delegate.connection_did_receive_data(b"inbound".to_vec());
        }
        assert_eq!(next_event(&mut h.events).await, Event::Data(b"inbound".to_vec()));
    }

    #[tokio::test]
    async fn reconnects_after_a_drop() {
        let mut h = harness(
            vec![Behavior::Open, Behavior::Open],
            vec![Duration::from_millis(5)],
        );

        h.connection.clone().start();
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_)));

        h.script
            .created(0)
            .emit_close(Some(ClientError::Transport("io".into())));

        assert_eq!(
            next_event(&mut h.events).await,
            Event::WillReconnect(ClientError::Transport("io".into()))
        );
        assert_eq!(next_event(&mut h.events).await, Event::Attempt(0));
        assert_eq!(next_event(&mut h.events).await, Event::Reconnected);
        assert_eq!(h.connection.state(), ReconnectableState::Running);
        assert_eq!(h.script.created_count(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_the_policy_says_never() {
        // Attempt 0 waits 10ms, attempt 1 waits 20ms, attempt 2 is refused.
        let mut h = harness(
            vec![Behavior::Open, Behavior::FailToOpen, Behavior::FailToOpen],
            vec![Duration::from_millis(10), Duration::from_millis(20)],
        );

        h.connection.clone().start();
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_)));

        h.script
            .created(0)
            .emit_close(Some(ClientError::Transport("io".into())));

        assert_eq!(
            next_event(&mut h.events).await,
            Event::WillReconnect(ClientError::Transport("io".into()))
        );
        assert_eq!(next_event(&mut h.events).await, Event::Attempt(0));
        assert_eq!(next_event(&mut h.events).await, Event::Attempt(1));
        assert_eq!(
            next_event(&mut h.events).await,
            Event::Close(Some(ClientError::Transport("io".into())))
        );
        assert_eq!(h.connection.state(), ReconnectableState::Disconnected);
    }

    #[tokio::test]
    async fn initial_start_failure_exhausting_the_policy_fails_the_open() {
        let mut h = harness(vec![Behavior::FailToOpen], vec![]);

        h.connection.clone().start();
        assert_eq!(
            next_event(&mut h.events).await,
            Event::FailToOpen(ClientError::Transport("io".into()))
        );
        assert_eq!(h.connection.state(), ReconnectableState::Disconnected);
    }

    #[tokio::test]
    async fn initial_start_failure_can_retry_before_opening() {
        let mut h = harness(
            vec![Behavior::FailToOpen, Behavior::Open],
            vec![Duration::from_millis(5)],
        );

        h.connection.clone().start();
        // Not a reconnect episode, so no will-reconnect notification.
        assert_eq!(next_event(&mut h.events).await, Event::Attempt(0));
        assert_eq!(next_event(&mut h.events).await, Event::Open(Some("cid".into())));
    }

    #[tokio::test]
    async fn send_fails_fast_while_reconnecting() {
        let mut h = harness(
            vec![Behavior::Open],
            vec![Duration::from_secs(30)],
        );

        h.connection.clone().start();
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_)));

        h.script.created(0).emit_close(Some(ClientError::Transport("io".into())));
        assert!(matches!(next_event(&mut h.events).await, Event::WillReconnect(_)));
        assert_eq!(next_event(&mut h.events).await, Event::Attempt(0));
        assert_eq!(h.connection.state(), ReconnectableState::Reconnecting);

        let (tx, mut rx) = mpsc::unbounded_channel();
        h.connection.send(
            b"frame".to_vec(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        assert_eq!(rx.recv().await, Some(Err(ClientError::ConnectionIsReconnecting)));
        // Nothing traversed the old connection.
        assert_eq!(h.script.created(0).sent.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn start_on_a_non_disconnected_connection_is_ignored() {
        let mut h = harness(vec![Behavior::Open], vec![]);

        h.connection.clone().start();
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_)));

        h.connection.clone().start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.connection.state(), ReconnectableState::Running);
        assert_eq!(h.script.created_count(), 1);
    }

    #[tokio::test]
    async fn stop_cancels_a_pending_restart_timer() {
        let mut h = harness(
            vec![Behavior::Open],
            vec![Duration::from_secs(30)],
        );

        h.connection.clone().start();
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_)));

        h.script.created(0).emit_close(Some(ClientError::Transport("io".into())));
        assert!(matches!(next_event(&mut h.events).await, Event::WillReconnect(_)));
        assert_eq!(next_event(&mut h.events).await, Event::Attempt(0));

        h.connection.clone().stop(None);
        assert_eq!(next_event(&mut h.events).await, Event::Close(None));
        assert_eq!(h.connection.state(), ReconnectableState::Disconnected);

        // The cancelled timer never creates another attempt.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.script.created_count(), 1);
    }

    #[tokio::test]
    async fn stop_while_running_forwards_the_close() {
        let mut h = harness(vec![Behavior::Open], vec![]);

        h.connection.clone().start();
        assert!(matches!(next_event(&mut h.events).await, Event::Open(_)));

        h.connection.clone().stop(None);
        assert_eq!(next_event(&mut h.events).await, Event::Close(None));
        assert_eq!(h.connection.state(), ReconnectableState::Disconnected);
    }
}
