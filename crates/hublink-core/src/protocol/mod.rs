//! Hub message model and the framing-protocol contract.
//!
//! A hub protocol turns [`HubMessage`] values into wire frames and back.
//! Messages within one frame are separated by the ASCII record separator;
//! the concrete JSON encoding lives in [`json`], the opening handshake in
//! [`handshake`].

pub mod handshake;
pub mod json;

use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ClientError, ClientResult};
use crate::negotiate::TransferFormat;

/// ASCII record separator terminating each frame-embedded message.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// An invocation of a hub method, client-bound or server-bound.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationMessage {
    /// Identifier correlating a completion with this call. Absent for
    /// fire-and-forget invocations.
    pub invocation_id: Option<String>,
    /// Name of the method to invoke.
    pub target: String,
    /// Positional arguments.
    pub arguments: Vec<Value>,
}

/// One item of a streaming invocation's result sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItemMessage {
    /// The invocation this item belongs to.
    pub invocation_id: String,
    /// The item payload.
    pub item: Value,
}

/// Terminal message of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionMessage {
    /// The invocation being completed.
    pub invocation_id: String,
    /// Result value, when the invocation produced one.
    pub result: Option<Value>,
    /// Error text, when the invocation failed server-side.
    pub error: Option<String>,
}

/// Client request to stop a streaming invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelInvocationMessage {
    /// The streaming invocation to cancel.
    pub invocation_id: String,
}

/// Server request to close the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseMessage {
    /// Reason for the close, if the server gave one.
    pub error: Option<String>,
    /// Whether the server permits an automatic reconnect.
    pub allow_reconnect: bool,
}

/// A hub message of any category.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Method invocation (type 1).
    Invocation(InvocationMessage),
    /// Streaming result item (type 2).
    StreamItem(StreamItemMessage),
    /// Invocation completion (type 3).
    Completion(CompletionMessage),
    /// Streaming method invocation (type 4).
    StreamInvocation(InvocationMessage),
    /// Stream cancellation request (type 5).
    CancelInvocation(CancelInvocationMessage),
    /// Keep-alive ping (type 6).
    Ping,
    /// Server-initiated close (type 7).
    Close(CloseMessage),
    /// A message type this client does not know.
    Other {
        /// The wire value of the unknown `type` field.
        message_type: i64,
    },
}

impl HubMessage {
    /// The wire value of this message's `type` field.
    pub fn message_type(&self) -> i64 {
        match self {
            Self::Invocation(_) => 1,
            Self::StreamItem(_) => 2,
            Self::Completion(_) => 3,
            Self::StreamInvocation(_) => 4,
            Self::CancelInvocation(_) => 5,
            Self::Ping => 6,
            Self::Close(_) => 7,
            Self::Other { message_type } => *message_type,
        }
    }
}

/// Encodes outbound hub messages and parses inbound frames.
pub trait HubProtocol: Send + Sync {
    /// Protocol name announced in the handshake.
    fn name(&self) -> &'static str;

    /// Protocol version announced in the handshake.
    fn version(&self) -> i32;

    /// Frame format this protocol requires of the transport.
    fn transfer_format(&self) -> TransferFormat;

    /// Parses all messages contained in one inbound frame, in frame order.
    fn parse_messages(&self, input: &[u8]) -> ClientResult<Vec<HubMessage>>;

    /// Encodes one message, including its terminating record separator.
    fn write_message(&self, message: &HubMessage) -> ClientResult<Vec<u8>>;
}

/// Typed, ordered access to the arguments of a client-bound invocation.
///
/// Handlers consume arguments front to back; each [`take`](Self::take)
/// decodes the next one into the requested type.
#[derive(Debug)]
pub struct ArgumentExtractor {
    arguments: VecDeque<Value>,
}

impl ArgumentExtractor {
    /// Wraps the argument list of an invocation.
    pub fn new(arguments: Vec<Value>) -> Self {
        Self {
            arguments: arguments.into(),
        }
    }

    /// Decodes the next argument.
    pub fn take<T: DeserializeOwned>(&mut self) -> ClientResult<T> {
        let value = self.arguments.pop_front().ok_or_else(|| {
            ClientError::InvalidOperation("invocation has no more arguments".into())
        })?;
        serde_json::from_value(value).map_err(ClientError::from)
    }

    /// Number of arguments not yet taken.
    pub fn remaining(&self) -> usize {
        self.arguments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extractor_decodes_arguments_in_order() {
        let mut extractor = ArgumentExtractor::new(vec![json!(1), json!("two"), json!([3])]);
        assert_eq!(extractor.remaining(), 3);
        assert_eq!(extractor.take::<i32>().unwrap(), 1);
        assert_eq!(extractor.take::<String>().unwrap(), "two");
        assert_eq!(extractor.take::<Vec<i32>>().unwrap(), vec![3]);
        assert_eq!(extractor.remaining(), 0);
    }

    #[test]
    fn extractor_fails_on_exhaustion_and_type_mismatch() {
        let mut extractor = ArgumentExtractor::new(vec![json!("text")]);
        assert!(matches!(
            extractor.take::<i32>(),
            Err(ClientError::Serialization(_))
        ));
        assert!(matches!(
            extractor.take::<i32>(),
            Err(ClientError::InvalidOperation(_))
        ));
    }

    #[test]
    fn message_types_match_the_wire_numbering() {
        assert_eq!(HubMessage::Ping.message_type(), 6);
        assert_eq!(
            HubMessage::Close(CloseMessage {
                error: None,
                allow_reconnect: false
            })
            .message_type(),
            7
        );
        assert_eq!(HubMessage::Other { message_type: 42 }.message_type(), 42);
    }
}
