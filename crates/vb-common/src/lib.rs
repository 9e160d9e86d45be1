use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod logging;

/// Event type substituted when the wire body does not carry one.
///
/// Such messages still decode, but no handler will ever be registered for
/// this type, so they are counted as failed and dropped.
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

fn default_event_type() -> String {
    UNKNOWN_EVENT_TYPE.to_string()
}

/// The decoded wire body of a consumed message.
///
/// Bodies are UTF-8 JSON objects keyed by `event_type`; everything else is
/// optional. The `payload` field is opaque to the consumer and is handed to
/// the registered handler as-is. Reply routing (`reply_to`,
/// `correlation_id`) travels in the AMQP delivery properties, never in the
/// body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default = "default_event_type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Create an envelope with just a type and payload, for publishing.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            event_id: None,
            request_id: None,
            session_id: None,
            timestamp: Some(Utc::now()),
            payload,
        }
    }
}

/// Point-in-time snapshot of a consumer's counters and state.
///
/// Counters are monotonic for the lifetime of the consumer instance;
/// `last_message_time` is overwritten on every delivery. Snapshots are
/// taken without locking the hot path, so concurrent updates may be
/// slightly stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub connection_errors: u64,
    pub last_message_time: Option<DateTime<Utc>>,
    pub connected: bool,
    pub consuming: bool,
    pub enabled: bool,
    pub queue_name: String,
    pub routing_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_decodes_minimal_body() {
        let envelope: EventEnvelope =
            serde_json::from_str(r#"{"event_type":"transcription"}"#).unwrap();
        assert_eq!(envelope.event_type, "transcription");
        assert!(envelope.event_id.is_none());
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn envelope_defaults_missing_event_type_to_unknown() {
        let envelope: EventEnvelope =
            serde_json::from_str(r#"{"payload":{"text":"hello"}}"#).unwrap();
        assert_eq!(envelope.event_type, UNKNOWN_EVENT_TYPE);
        assert_eq!(envelope.payload, json!({"text": "hello"}));
    }

    #[test]
    fn envelope_rejects_non_object_body() {
        assert!(serde_json::from_str::<EventEnvelope>("\"just a string\"").is_err());
        assert!(serde_json::from_str::<EventEnvelope>("42").is_err());
    }
}
