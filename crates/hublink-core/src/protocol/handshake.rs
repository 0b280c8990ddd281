//! The hub-protocol handshake exchanged right after transport open.
//!
//! The client sends `{"protocol": name, "version": n}` terminated by the
//! record separator; the server answers with a JSON object terminated the
//! same way. `{}` acknowledges, `{"error": "..."}` rejects. Bytes after
//! the terminator are ordinary hub messages and are handed back to the
//! caller for the normal parse path.

use serde::{Deserialize, Serialize};

use super::RECORD_SEPARATOR;
use crate::error::{ClientError, ClientResult};

#[derive(Serialize)]
struct HandshakeRequest<'a> {
    protocol: &'a str,
    version: i32,
}

/// The server's reply to a handshake request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandshakeResponse {
    /// Rejection reason; absent on success.
    pub error: Option<String>,
}

impl HandshakeResponse {
    /// Whether the server accepted the requested protocol.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Encodes the opening protocol-selection frame.
pub fn create_request(protocol: &str, version: i32) -> ClientResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(&HandshakeRequest { protocol, version })?;
    bytes.push(RECORD_SEPARATOR);
    Ok(bytes)
}

/// Parses the server's handshake reply from the head of `data`.
///
/// Returns the reply and whatever bytes follow the terminator.
pub fn parse_response(data: &[u8]) -> ClientResult<(HandshakeResponse, Vec<u8>)> {
    let terminator = data
        .iter()
        .position(|&b| b == RECORD_SEPARATOR)
        .ok_or_else(|| ClientError::Handshake("response is missing its terminator".into()))?;

    let response: HandshakeResponse = serde_json::from_slice(&data[..terminator])
        .map_err(|e| ClientError::Handshake(e.to_string()))?;

    Ok((response, data[terminator + 1..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_parse() {
        let mut bytes = create_request("json", 1).unwrap();
        assert_eq!(bytes, b"{\"protocol\":\"json\",\"version\":1}\x1e");

        // A `{}` reply shaped like our own terminator framing parses clean.
        bytes = b"{}\x1e".to_vec();
        let (response, rest) = parse_response(&bytes).unwrap();
        assert!(response.is_ok());
        assert!(rest.is_empty());
    }

    #[test]
    fn error_reply_is_a_rejection() {
        let (response, rest) = parse_response(b"{\"error\":\"unknown protocol\"}\x1e").unwrap();
        assert!(!response.is_ok());
        assert_eq!(response.error.as_deref(), Some("unknown protocol"));
        assert!(rest.is_empty());
    }

    #[test]
    fn bytes_after_the_terminator_are_returned() {
        let (response, rest) = parse_response(b"{}\x1e{\"type\":6}\x1e").unwrap();
        assert!(response.is_ok());
        assert_eq!(rest, b"{\"type\":6}\x1e");
    }

    #[test]
    fn missing_terminator_fails() {
        assert!(matches!(
            parse_response(b"{}"),
            Err(ClientError::Handshake(_))
        ));
    }

    #[test]
    fn malformed_reply_fails() {
        assert!(matches!(
            parse_response(b"nope\x1e"),
            Err(ClientError::Handshake(_))
        ));
    }
}
