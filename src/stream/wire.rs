//! Wire codec for the streaming JSON envelope
//!
//! Every streaming connection shares one envelope: outbound subscribe /
//! unsubscribe / ping frames, and an inbound tagged union. Inbound frames
//! that do not parse into exactly one tag are reported as
//! [`InboundFrame::Unparseable`] so the caller can drop and log them; a bad
//! frame never tears down a connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Benign unsubscribe race: the server already dropped the subscription
/// (e.g. its state was wiped by a reconnect before the client noticed).
pub const ERROR_CODE_SUBSCRIPTION_NOT_FOUND: &str = "subscription_not_found";
const ERROR_MESSAGE_SUBSCRIPTION_NOT_FOUND: &str = "subscription not found";

/// Outbound subscribe envelope
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeFrame {
    #[serde(rename = "type")]
    pub feed_type: String,
    pub authorization: String,
    pub payload: Value,
}

impl SubscribeFrame {
    /// Build a subscribe frame, stamping the tracking fields into the
    /// feed-specific payload
    pub fn new(feed_type: &str, api_key: &str, mut payload: Value, subscription_id: &str) -> Self {
        if let Value::Object(map) = &mut payload {
            map.insert(
                "subscriptionId".to_string(),
                Value::String(subscription_id.to_string()),
            );
            map.insert("subscriptionTracking".to_string(), Value::Bool(true));
        }
        Self {
            feed_type: feed_type.to_string(),
            authorization: api_key.to_string(),
            payload,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Outbound unsubscribe envelope
///
/// `subscription_id = None` unsubscribes everything on the connection.
pub fn unsubscribe_frame(api_key: &str, subscription_id: Option<&str>) -> Value {
    let payload = match subscription_id {
        Some(id) => serde_json::json!({ "subscriptionId": id }),
        None => serde_json::json!({}),
    };
    serde_json::json!({
        "type": "unsubscribe",
        "authorization": api_key,
        "payload": payload,
    })
}

/// Keepalive ping frame
pub fn ping_frame() -> Value {
    serde_json::json!({ "event": "ping" })
}

/// Inbound frame, decoded into exactly one tag
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Full-state snapshot; applied immediately, never batched
    Init { payload: Value },
    /// Incremental pulse updates
    UpdateToken { payload: Value },
    NewToken { payload: Value },
    RemoveToken { payload: Value },
    /// Server acknowledged a subscribe
    SubscribedAck { subscription_id: String },
    /// Server-reported error
    Error {
        message: String,
        code: Option<String>,
        details: Option<Value>,
    },
    /// Keepalive reply; consumed as a liveness signal only
    Pong,
    /// Position / transaction data frame keyed by `data`
    Data { data: Value },
    /// Frame did not match any tag; drop and log, never crash
    Unparseable,
}

impl InboundFrame {
    /// Whether this is the benign "subscription not found" unsubscribe race
    ///
    /// Matched on the structured `code` when the server provides one, with
    /// an exact-message fallback. Anything else is a genuine error.
    pub fn is_benign_unsubscribe_race(&self) -> bool {
        match self {
            Self::Error { code: Some(code), .. } => code == ERROR_CODE_SUBSCRIPTION_NOT_FOUND,
            Self::Error { message, code: None, .. } => {
                message.eq_ignore_ascii_case(ERROR_MESSAGE_SUBSCRIPTION_NOT_FOUND)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: Option<String>,
    event: Option<String>,
    payload: Option<Value>,
    #[serde(rename = "subscriptionId")]
    subscription_id: Option<String>,
    error: Option<Value>,
    code: Option<String>,
    details: Option<Value>,
    data: Option<Value>,
}

/// Decode one inbound frame
pub fn decode_frame(text: &str) -> InboundFrame {
    let Ok(raw) = serde_json::from_str::<RawFrame>(text) else {
        return InboundFrame::Unparseable;
    };

    if let Some(error) = raw.error {
        let message = match error {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return InboundFrame::Error {
            message,
            code: raw.code,
            details: raw.details,
        };
    }

    if let Some(event) = raw.event.as_deref() {
        return match event {
            "pong" => InboundFrame::Pong,
            "subscribed" => match raw.subscription_id {
                Some(subscription_id) => InboundFrame::SubscribedAck { subscription_id },
                None => InboundFrame::Unparseable,
            },
            _ => InboundFrame::Unparseable,
        };
    }

    if let Some(frame_type) = raw.frame_type.as_deref() {
        let payload = raw.payload.unwrap_or(Value::Null);
        return match frame_type {
            "init" => InboundFrame::Init { payload },
            "update-token" => InboundFrame::UpdateToken { payload },
            "new-token" => InboundFrame::NewToken { payload },
            "remove-token" => InboundFrame::RemoveToken { payload },
            _ => InboundFrame::Unparseable,
        };
    }

    if let Some(data) = raw.data {
        return InboundFrame::Data { data };
    }

    InboundFrame::Unparseable
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_frame_stamps_tracking_fields() {
        let frame = SubscribeFrame::new(
            "positions",
            "key-123",
            json!({ "wallet": "0xabc", "chains": ["evm:1"] }),
            "sub-1",
        );
        let value = frame.to_json();
        assert_eq!(value["type"], "positions");
        assert_eq!(value["authorization"], "key-123");
        assert_eq!(value["payload"]["wallet"], "0xabc");
        assert_eq!(value["payload"]["subscriptionId"], "sub-1");
        assert_eq!(value["payload"]["subscriptionTracking"], true);
    }

    #[test]
    fn test_unsubscribe_frames() {
        let one = unsubscribe_frame("key", Some("sub-9"));
        assert_eq!(one["type"], "unsubscribe");
        assert_eq!(one["payload"]["subscriptionId"], "sub-9");

        let all = unsubscribe_frame("key", None);
        assert_eq!(all["payload"], json!({}));
    }

    #[test]
    fn test_decode_tagged_frames() {
        assert_eq!(
            decode_frame(r#"{"type":"init","payload":{"tokens":[]}}"#),
            InboundFrame::Init { payload: json!({"tokens": []}) }
        );
        assert_eq!(
            decode_frame(r#"{"type":"update-token","payload":{"viewName":"trending"}}"#),
            InboundFrame::UpdateToken { payload: json!({"viewName": "trending"}) }
        );
        assert_eq!(
            decode_frame(r#"{"event":"subscribed","subscriptionId":"s-1"}"#),
            InboundFrame::SubscribedAck { subscription_id: "s-1".to_string() }
        );
        assert_eq!(decode_frame(r#"{"event":"pong"}"#), InboundFrame::Pong);
        assert_eq!(
            decode_frame(r#"{"data":{"txHash":"0x1"}}"#),
            InboundFrame::Data { data: json!({"txHash": "0x1"}) }
        );
    }

    #[test]
    fn test_decode_error_frames() {
        let err = decode_frame(r#"{"error":"boom","details":{"k":1}}"#);
        assert_eq!(
            err,
            InboundFrame::Error {
                message: "boom".to_string(),
                code: None,
                details: Some(json!({"k": 1})),
            }
        );
        assert!(!err.is_benign_unsubscribe_race());

        let benign = decode_frame(r#"{"error":"gone","code":"subscription_not_found"}"#);
        assert!(benign.is_benign_unsubscribe_race());

        // Exact-message fallback when no structured code is present
        let legacy = decode_frame(r#"{"error":"Subscription not found"}"#);
        assert!(legacy.is_benign_unsubscribe_race());
        let near_miss = decode_frame(r#"{"error":"subscription not found for id x"}"#);
        assert!(!near_miss.is_benign_unsubscribe_race());
    }

    #[test]
    fn test_decode_unparseable_frames() {
        assert_eq!(decode_frame("not json"), InboundFrame::Unparseable);
        assert_eq!(decode_frame(r#"{"unknown":1}"#), InboundFrame::Unparseable);
        assert_eq!(decode_frame(r#"{"type":"mystery"}"#), InboundFrame::Unparseable);
        assert_eq!(decode_frame(r#"{"event":"subscribed"}"#), InboundFrame::Unparseable);
    }
}
