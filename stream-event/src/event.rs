//! Event types: the tagged union carried over the stream (type + data).
//! Envelope fields (`correlation_id`, `timestamp`) are applied separately.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stream event: the wire shape is `{"type": ..., "data": ...}` with the
/// envelope merged in at emit time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stage-boundary status marker ("searching", "reasoning", ...).
    Status(Value),
    /// Routing decisions, extracted entities, cache/gate annotations.
    Metadata(Value),
    /// One token of the assembled answer.
    Token(String),
    /// Retrieval citations for the answer.
    Sources(Vec<Value>),
    /// Typed error; also used as the terminating event on abort.
    Error(ErrorData),
    /// Terminal event with summary data (execution time, route).
    Done(Value),
}

/// Payload of an `error` event.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorData {
    pub error_type: String,
    pub message: String,
}

/// Why an event failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventValidationError {
    /// Token events must carry a non-empty string.
    EmptyToken,
    /// Status data must be a string or an object.
    BadStatusData,
    /// Metadata data must be a JSON object.
    BadMetadataData,
    /// Every sources entry must be a JSON object.
    BadSourceEntry,
    /// Error events must carry a non-empty message.
    EmptyErrorMessage,
}

impl std::fmt::Display for EventValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::EmptyToken => "token event with empty content",
            Self::BadStatusData => "status data must be a string or object",
            Self::BadMetadataData => "metadata data must be an object",
            Self::BadSourceEntry => "sources entries must be objects",
            Self::EmptyErrorMessage => "error event with empty message",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for EventValidationError {}

impl StreamEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Metadata(_) => "metadata",
            Self::Token(_) => "token",
            Self::Sources(_) => "sources",
            Self::Error(_) => "error",
            Self::Done(_) => "done",
        }
    }

    /// Schema check applied before the event is yielded to the consumer.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        match self {
            Self::Token(t) if t.is_empty() => Err(EventValidationError::EmptyToken),
            Self::Status(v) if !(v.is_string() || v.is_object()) => {
                Err(EventValidationError::BadStatusData)
            }
            Self::Metadata(v) if !v.is_object() => Err(EventValidationError::BadMetadataData),
            Self::Sources(items) if items.iter().any(|s| !s.is_object()) => {
                Err(EventValidationError::BadSourceEntry)
            }
            Self::Error(e) if e.message.is_empty() => Err(EventValidationError::EmptyErrorMessage),
            _ => Ok(()),
        }
    }

    /// Serializes to `{"type": ..., "data": ...}` without envelope fields.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_type_tag_and_data() {
        let ev = StreamEvent::Token("hello ".to_string());
        let v = ev.to_value().unwrap();
        assert_eq!(v["type"], "token");
        assert_eq!(v["data"], "hello ");
    }

    #[test]
    fn validate_accepts_wellformed_events() {
        assert!(StreamEvent::Status(json!("searching")).validate().is_ok());
        assert!(StreamEvent::Metadata(json!({"route": "cache"})).validate().is_ok());
        assert!(StreamEvent::Sources(vec![json!({"id": 1})]).validate().is_ok());
        assert!(StreamEvent::Done(json!({"execution_time": 0.1})).validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_token_and_bad_metadata() {
        assert_eq!(
            StreamEvent::Token(String::new()).validate(),
            Err(EventValidationError::EmptyToken)
        );
        assert_eq!(
            StreamEvent::Metadata(json!("not-an-object")).validate(),
            Err(EventValidationError::BadMetadataData)
        );
        assert_eq!(
            StreamEvent::Sources(vec![json!(42)]).validate(),
            Err(EventValidationError::BadSourceEntry)
        );
    }
}
