//! Negotiation contract: the POST+JSON exchange that selects a transport
//! and hands out connection identifiers.
//!
//! The HTTP client itself is an external collaborator; this module fixes
//! its contract ([`NegotiateClient`]), the payload model, and the URL
//! arithmetic for the negotiate and start endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// A raw HTTP response from the negotiation endpoint.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

/// HTTP client contract for the negotiation step: one POST with an empty
/// body, returning status and body verbatim.
///
/// Informational (1xx) responses are returned like any other status so the
/// negotiation driver can keep waiting for a terminal one.
#[async_trait]
pub trait NegotiateClient: Send + Sync {
    /// Issues `POST url` with an empty body and the given bearer token.
    async fn post(&self, url: &Url, access_token: Option<String>) -> ClientResult<HttpResponse>;
}

/// Transfer formats a transport endpoint supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TransferFormat {
    /// UTF-8 text frames.
    Text,
    /// Binary frames.
    Binary,
}

/// One transport advertised by the negotiation response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    /// Transport name, e.g. `"WebSockets"`.
    pub transport: String,
    /// Formats the endpoint accepts over this transport.
    pub transfer_formats: Vec<TransferFormat>,
}

impl AvailableTransport {
    /// The transport entry assumed when negotiation is skipped.
    pub fn websocket() -> Self {
        Self {
            transport: "WebSockets".into(),
            transfer_formats: vec![TransferFormat::Text, TransferFormat::Binary],
        }
    }
}

/// A negotiation payload asking the client to restart against another URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirection {
    /// The URL to negotiate against instead.
    pub url: Url,
    /// Token overriding the configured access-token provider.
    pub access_token: Option<String>,
}

/// A terminal negotiation payload carrying connection identifiers and the
/// advertised transports.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResponse {
    /// Server-assigned connection ID.
    pub connection_id: String,
    /// Token identifying the connection on the wire, when the server
    /// distinguishes it from the ID.
    pub connection_token: Option<String>,
    /// Transports the server is willing to speak.
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
}

impl NegotiationResponse {
    /// The value for the start URL's `id` query parameter.
    pub fn start_id(&self) -> &str {
        self.connection_token.as_deref().unwrap_or(&self.connection_id)
    }
}

/// Either kind of 200-level negotiation payload.
#[derive(Debug, Clone)]
pub enum NegotiatePayload {
    /// Restart negotiation elsewhere.
    Redirection(Redirection),
    /// Proceed with transport selection.
    Negotiation(NegotiationResponse),
}

impl NegotiatePayload {
    /// Parses a negotiation response body.
    pub fn parse(body: &[u8]) -> ClientResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ClientError::InvalidNegotiationResponse(e.to_string()))?;

        let payload = if value.get("url").is_some() {
            Self::Redirection(
                serde_json::from_value(value)
                    .map_err(|e| ClientError::InvalidNegotiationResponse(e.to_string()))?,
            )
        } else {
            Self::Negotiation(
                serde_json::from_value(value)
                    .map_err(|e| ClientError::InvalidNegotiationResponse(e.to_string()))?,
            )
        };
        Ok(payload)
    }
}

/// Builds the negotiate endpoint for `base`:
/// `{base}/negotiate?negotiateVersion=1`, preserving any existing query.
pub fn negotiate_url(base: &Url) -> ClientResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ClientError::InvalidOperation(format!("cannot negotiate against {base}")))?
        .pop_if_empty()
        .push("negotiate");
    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    Ok(url)
}

/// Builds the transport start URL: `base` with `id={id}` appended when an
/// identifier is present.
pub fn start_url(base: &Url, id: Option<&str>) -> Url {
    let mut url = base.clone();
    if let Some(id) = id {
        url.query_pairs_mut().append_pair("id", id);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_url_appends_segment_and_version() {
        let base = Url::parse("https://example.com/chat").unwrap();
        let url = negotiate_url(&base).unwrap();
        assert_eq!(url.as_str(), "https://example.com/chat/negotiate?negotiateVersion=1");
    }

    #[test]
    fn negotiate_url_handles_trailing_slash_and_query() {
        let base = Url::parse("https://example.com/chat/?hub=echo").unwrap();
        let url = negotiate_url(&base).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/chat/negotiate?hub=echo&negotiateVersion=1"
        );
    }

    #[test]
    fn start_url_appends_id_when_present() {
        let base = Url::parse("https://example.com/chat?hub=echo").unwrap();
        let url = start_url(&base, Some("abc"));
        assert_eq!(url.as_str(), "https://example.com/chat?hub=echo&id=abc");

        let url = start_url(&base, None);
        assert_eq!(url.as_str(), "https://example.com/chat?hub=echo");
    }

    #[test]
    fn parses_negotiation_payload() {
        let body = br#"{
            "connectionId": "c1",
            "connectionToken": "t1",
            "availableTransports": [
                {"transport": "WebSockets", "transferFormats": ["Text", "Binary"]}
            ]
        }"#;

        let payload = NegotiatePayload::parse(body).unwrap();
        let NegotiatePayload::Negotiation(response) = payload else {
            panic!("expected a negotiation payload");
        };
        assert_eq!(response.connection_id, "c1");
        assert_eq!(response.start_id(), "t1");
        assert_eq!(response.available_transports.len(), 1);
        assert_eq!(response.available_transports[0].transport, "WebSockets");
        assert_eq!(
            response.available_transports[0].transfer_formats,
            vec![TransferFormat::Text, TransferFormat::Binary]
        );
    }

    #[test]
    fn start_id_falls_back_to_connection_id() {
        let body = br#"{"connectionId": "c1", "availableTransports": []}"#;
        let NegotiatePayload::Negotiation(response) = NegotiatePayload::parse(body).unwrap() else {
            panic!("expected a negotiation payload");
        };
        assert_eq!(response.start_id(), "c1");
    }

    #[test]
    fn parses_redirection_payload() {
        let body = br#"{"url": "https://other.example.com/chat", "accessToken": "tok"}"#;
        let NegotiatePayload::Redirection(redirect) = NegotiatePayload::parse(body).unwrap() else {
            panic!("expected a redirection payload");
        };
        assert_eq!(redirect.url.as_str(), "https://other.example.com/chat");
        assert_eq!(redirect.access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn malformed_payload_is_an_invalid_negotiation_response() {
        let err = NegotiatePayload::parse(b"not json").unwrap_err();
        assert!(matches!(err, ClientError::InvalidNegotiationResponse(_)));

        let err = NegotiatePayload::parse(b"{\"connectionToken\": 3}").unwrap_err();
        assert!(matches!(err, ClientError::InvalidNegotiationResponse(_)));
    }
}
