//! Configuration for HTTP-based hub connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::callback::CallbackQueue;
use crate::negotiate::NegotiateClient;

/// Callable producing an optional bearer token for negotiation and
/// transport requests.
pub type AccessTokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Factory for the HTTP client used by the negotiation step.
pub type NegotiateClientFactory = Arc<dyn Fn() -> Arc<dyn NegotiateClient> + Send + Sync>;

/// Configuration for an HTTP-based connection.
#[derive(Clone)]
pub struct HttpConnectionOptions {
    /// Headers applied to negotiation and transport requests.
    pub headers: HashMap<String, String>,
    /// Produces the bearer token attached to outgoing requests.
    pub access_token_provider: Option<AccessTokenProvider>,
    /// When true, skip the negotiation step and open a WebSocket directly.
    pub skip_negotiation: bool,
    /// Interval between keep-alive pings. Absent disables keep-alive.
    pub keep_alive_interval: Option<Duration>,
    /// Maximum size of a single inbound WebSocket message.
    pub max_message_size: Option<usize>,
    /// Accept server TLS certificates that fail verification.
    pub accept_invalid_certs: bool,
    /// Timeout applied to negotiation requests.
    pub request_timeout: Duration,
    /// Executor for all user-visible delegate callbacks and completions.
    pub callback_queue: CallbackQueue,
    /// Overrides the HTTP client used for negotiation.
    pub negotiate_client_factory: Option<NegotiateClientFactory>,
}

impl Default for HttpConnectionOptions {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            access_token_provider: None,
            skip_negotiation: false,
            keep_alive_interval: None,
            max_message_size: None,
            accept_invalid_certs: false,
            request_timeout: Duration::from_secs(30),
            callback_queue: CallbackQueue::shared(),
            negotiate_client_factory: None,
        }
    }
}

impl HttpConnectionOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header to every negotiation and transport request.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the access-token provider.
    pub fn with_access_token_provider(
        mut self,
        provider: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.access_token_provider = Some(Arc::new(provider));
        self
    }

    /// Sets a fixed access token.
    pub fn with_access_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.with_access_token_provider(move || Some(token.clone()))
    }

    /// Skips the negotiation step.
    pub fn with_skip_negotiation(mut self) -> Self {
        self.skip_negotiation = true;
        self
    }

    /// Sets the keep-alive ping interval.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Caps the size of a single inbound WebSocket message.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Sets the callback executor.
    pub fn with_callback_queue(mut self, queue: CallbackQueue) -> Self {
        self.callback_queue = queue;
        self
    }

    /// Resolves the current access token, if a provider is configured.
    pub fn access_token(&self) -> Option<String> {
        self.access_token_provider.as_ref().and_then(|p| p())
    }

    /// Returns a copy of these options whose token provider yields `token`.
    ///
    /// Used when a negotiation redirect carries its own access token.
    pub fn with_fixed_token(&self, token: String) -> Self {
        let mut options = self.clone();
        options.access_token_provider = Some(Arc::new(move || Some(token.clone())));
        options
    }
}

impl std::fmt::Debug for HttpConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnectionOptions")
            .field("headers", &self.headers)
            .field("has_access_token_provider", &self.access_token_provider.is_some())
            .field("skip_negotiation", &self.skip_negotiation)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("max_message_size", &self.max_message_size)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_sets_fields() {
        let options = HttpConnectionOptions::new()
            .with_header("x-tenant", "acme")
            .with_access_token("secret")
            .with_keep_alive_interval(Duration::from_secs(15))
            .with_max_message_size(1 << 20)
            .with_skip_negotiation();

        assert_eq!(options.headers.get("x-tenant").map(String::as_str), Some("acme"));
        assert_eq!(options.access_token().as_deref(), Some("secret"));
        assert_eq!(options.keep_alive_interval, Some(Duration::from_secs(15)));
        assert_eq!(options.max_message_size, Some(1 << 20));
        assert!(options.skip_negotiation);
    }

    #[tokio::test]
    async fn fixed_token_overrides_provider() {
        let options = HttpConnectionOptions::new().with_access_token("original");
        let redirected = options.with_fixed_token("redirected".into());

        assert_eq!(options.access_token().as_deref(), Some("original"));
        assert_eq!(redirected.access_token().as_deref(), Some("redirected"));
    }
}
