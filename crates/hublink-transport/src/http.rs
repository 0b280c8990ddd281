//! HTTP client implementation for the negotiation step.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use tracing::debug;
use url::Url;

use hublink_core::{ClientError, ClientResult, HttpConnectionOptions, HttpResponse, NegotiateClient};

/// [`NegotiateClient`] over `reqwest`.
///
/// Configured headers are applied to every request; the bearer token is
/// supplied per call because negotiation redirects can replace it.
pub struct HttpNegotiateClient {
    client: Client,
    headers: Vec<(String, String)>,
}

impl HttpNegotiateClient {
    /// Creates a client honouring the connection options.
    pub fn new(options: &HttpConnectionOptions) -> Self {
        let mut builder = ClientBuilder::new().timeout(options.request_timeout);
        if options.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().expect("failed to create HTTP client");

        Self {
            client,
            headers: options.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

#[async_trait]
impl NegotiateClient for HttpNegotiateClient {
    async fn post(&self, url: &Url, access_token: Option<String>) -> ClientResult<HttpResponse> {
        let mut request = self.client.post(url.as_str());
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status_code = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .to_vec();

        debug!(url = %url, status = status_code, "Negotiation request finished");
        Ok(HttpResponse { status_code, body })
    }
}
