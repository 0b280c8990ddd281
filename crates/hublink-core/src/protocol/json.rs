//! JSON hub protocol: record-separated JSON objects with a numeric `type`
//! field.

use serde_json::{Map, Value, json};
use tracing::trace;

use super::{
    CancelInvocationMessage, CloseMessage, CompletionMessage, HubMessage, HubProtocol,
    InvocationMessage, RECORD_SEPARATOR, StreamItemMessage,
};
use crate::error::{ClientError, ClientResult};
use crate::negotiate::TransferFormat;

/// The JSON framing protocol, version 1.
#[derive(Debug, Default)]
pub struct JsonHubProtocol;

impl JsonHubProtocol {
    /// Creates the protocol.
    pub fn new() -> Self {
        Self
    }
}

impl HubProtocol for JsonHubProtocol {
    fn name(&self) -> &'static str {
        "json"
    }

    fn version(&self) -> i32 {
        1
    }

    fn transfer_format(&self) -> TransferFormat {
        TransferFormat::Text
    }

    fn parse_messages(&self, input: &[u8]) -> ClientResult<Vec<HubMessage>> {
        let mut messages = Vec::new();
        for chunk in input.split(|&b| b == RECORD_SEPARATOR) {
            if chunk.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_slice(chunk)
                .map_err(|e| ClientError::Protocol(e.to_string()))?;
            messages.push(parse_message(value)?);
        }
        trace!(count = messages.len(), "parsed hub messages from frame");
        Ok(messages)
    }

    fn write_message(&self, message: &HubMessage) -> ClientResult<Vec<u8>> {
        let value = render_message(message)?;
        let mut bytes = serde_json::to_vec(&value)?;
        bytes.push(RECORD_SEPARATOR);
        Ok(bytes)
    }
}

fn parse_message(value: Value) -> ClientResult<HubMessage> {
    let message_type = value
        .get("type")
        .and_then(Value::as_i64)
        .ok_or_else(|| ClientError::Protocol("message has no numeric type field".into()))?;

    let message = match message_type {
        1 => HubMessage::Invocation(parse_invocation(&value)?),
        2 => HubMessage::StreamItem(StreamItemMessage {
            invocation_id: required_string(&value, "invocationId")?,
            item: value.get("item").cloned().unwrap_or(Value::Null),
        }),
        3 => HubMessage::Completion(CompletionMessage {
            invocation_id: required_string(&value, "invocationId")?,
            result: value.get("result").cloned(),
            error: optional_string(&value, "error"),
        }),
        4 => HubMessage::StreamInvocation(parse_invocation(&value)?),
        5 => HubMessage::CancelInvocation(CancelInvocationMessage {
            invocation_id: required_string(&value, "invocationId")?,
        }),
        6 => HubMessage::Ping,
        7 => HubMessage::Close(CloseMessage {
            error: optional_string(&value, "error"),
            allow_reconnect: value
                .get("allowReconnect")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        other => HubMessage::Other {
            message_type: other,
        },
    };
    Ok(message)
}

fn parse_invocation(value: &Value) -> ClientResult<InvocationMessage> {
    let arguments = match value.get("arguments") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(ClientError::Protocol("invocation arguments are not an array".into()));
        }
    };
    Ok(InvocationMessage {
        invocation_id: optional_string(value, "invocationId"),
        target: required_string(value, "target")?,
        arguments,
    })
}

fn required_string(value: &Value, field: &str) -> ClientResult<String> {
    optional_string(value, field)
        .ok_or_else(|| ClientError::Protocol(format!("message is missing the {field} field")))
}

fn optional_string(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_owned)
}

fn render_message(message: &HubMessage) -> ClientResult<Value> {
    let value = match message {
        HubMessage::Invocation(inv) => render_invocation(1, inv),
        HubMessage::StreamInvocation(inv) => render_invocation(4, inv),
        HubMessage::StreamItem(item) => json!({
            "type": 2,
            "invocationId": item.invocation_id,
            "item": item.item,
        }),
        HubMessage::Completion(completion) => {
            let mut object = Map::new();
            object.insert("type".into(), json!(3));
            object.insert("invocationId".into(), json!(completion.invocation_id));
            if let Some(result) = &completion.result {
                object.insert("result".into(), result.clone());
            }
            if let Some(error) = &completion.error {
                object.insert("error".into(), json!(error));
            }
            Value::Object(object)
        }
        HubMessage::CancelInvocation(cancel) => json!({
            "type": 5,
            "invocationId": cancel.invocation_id,
        }),
        HubMessage::Ping => json!({"type": 6}),
        HubMessage::Close(close) => {
            let mut object = Map::new();
            object.insert("type".into(), json!(7));
            if let Some(error) = &close.error {
                object.insert("error".into(), json!(error));
            }
            Value::Object(object)
        }
        HubMessage::Other { message_type } => {
            return Err(ClientError::Protocol(format!(
                "cannot encode unknown message type {message_type}"
            )));
        }
    };
    Ok(value)
}

fn render_invocation(message_type: i64, invocation: &InvocationMessage) -> Value {
    let mut object = Map::new();
    object.insert("type".into(), json!(message_type));
    if let Some(id) = &invocation.invocation_id {
        object.insert("invocationId".into(), json!(id));
    }
    object.insert("target".into(), json!(invocation.target));
    object.insert("arguments".into(), Value::Array(invocation.arguments.clone()));
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(parts: &[&str]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for part in parts {
            bytes.extend_from_slice(part.as_bytes());
            bytes.push(RECORD_SEPARATOR);
        }
        bytes
    }

    #[test]
    fn parses_messages_in_frame_order() {
        let protocol = JsonHubProtocol::new();
        let input = frame(&[
            r#"{"type":2,"invocationId":"1","item":10}"#,
            r#"{"type":6}"#,
            r#"{"type":3,"invocationId":"1","result":42}"#,
        ]);

        let messages = protocol.parse_messages(&input).unwrap();
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[0], HubMessage::StreamItem(item) if item.item == json!(10)));
        assert!(matches!(messages[1], HubMessage::Ping));
        assert!(
            matches!(&messages[2], HubMessage::Completion(c) if c.result == Some(json!(42)) && c.error.is_none())
        );
    }

    #[test]
    fn parses_client_bound_invocation() {
        let protocol = JsonHubProtocol::new();
        let input = frame(&[r#"{"type":1,"target":"Notify","arguments":[1,"x"]}"#]);

        let messages = protocol.parse_messages(&input).unwrap();
        let HubMessage::Invocation(inv) = &messages[0] else {
            panic!("expected an invocation");
        };
        assert_eq!(inv.target, "Notify");
        assert_eq!(inv.invocation_id, None);
        assert_eq!(inv.arguments, vec![json!(1), json!("x")]);
    }

    #[test]
    fn parses_close_and_unknown_types() {
        let protocol = JsonHubProtocol::new();
        let input = frame(&[r#"{"type":7,"error":"kicked","allowReconnect":true}"#, r#"{"type":99}"#]);

        let messages = protocol.parse_messages(&input).unwrap();
        assert!(matches!(
            &messages[0],
            HubMessage::Close(c) if c.error.as_deref() == Some("kicked") && c.allow_reconnect
        ));
        assert!(matches!(messages[1], HubMessage::Other { message_type: 99 }));
    }

    #[test]
    fn malformed_frames_fail_as_protocol_errors() {
        let protocol = JsonHubProtocol::new();

        let err = protocol.parse_messages(&frame(&["not json"])).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));

        let err = protocol.parse_messages(&frame(&[r#"{"notype":1}"#])).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));

        let err = protocol
            .parse_messages(&frame(&[r#"{"type":3,"result":1}"#]))
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn writes_invocation_with_id_and_terminator() {
        let protocol = JsonHubProtocol::new();
        let bytes = protocol
            .write_message(&HubMessage::Invocation(InvocationMessage {
                invocation_id: Some("7".into()),
                target: "Add".into(),
                arguments: vec![json!(1), json!(2)],
            }))
            .unwrap();

        assert_eq!(*bytes.last().unwrap(), RECORD_SEPARATOR);
        let value: Value = serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap();
        assert_eq!(value["type"], json!(1));
        assert_eq!(value["invocationId"], json!("7"));
        assert_eq!(value["target"], json!("Add"));
        assert_eq!(value["arguments"], json!([1, 2]));
    }

    #[test]
    fn writes_fire_and_forget_invocation_without_id() {
        let protocol = JsonHubProtocol::new();
        let bytes = protocol
            .write_message(&HubMessage::Invocation(InvocationMessage {
                invocation_id: None,
                target: "Log".into(),
                arguments: vec![],
            }))
            .unwrap();

        let value: Value = serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap();
        assert!(value.get("invocationId").is_none());
    }

    #[test]
    fn write_then_parse_round_trips() {
        let protocol = JsonHubProtocol::new();
        let original = HubMessage::CancelInvocation(CancelInvocationMessage {
            invocation_id: "3".into(),
        });

        let bytes = protocol.write_message(&original).unwrap();
        let parsed = protocol.parse_messages(&bytes).unwrap();
        assert_eq!(parsed, vec![original]);
    }
}
