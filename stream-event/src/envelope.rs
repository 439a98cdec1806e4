//! Envelope (`correlation_id`, `timestamp`) injected into each event.
//! `EnvelopeState` holds the per-stream correlation id and stamps events.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

/// Envelope fields attached to each serialized event.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Correlation id; constant within one stream.
    pub correlation_id: Option<String>,
    /// Seconds since the Unix epoch at emit time.
    pub timestamp: Option<f64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, ts: f64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.correlation_id {
            obj.entry("correlation_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ts) = self.timestamp {
            if let Some(num) = serde_json::Number::from_f64(ts) {
                obj.entry("timestamp").or_insert_with(|| Value::Number(num));
            }
        }
    }
}

/// Per-stream envelope state: a fixed correlation id, fresh timestamp per event.
pub struct EnvelopeState {
    pub correlation_id: String,
}

impl EnvelopeState {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
        }
    }

    /// Stamps the serialized event with the correlation id and current time.
    pub fn inject_into(&self, value: &mut Value) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Envelope::new()
            .with_correlation_id(self.correlation_id.as_str())
            .with_timestamp(ts)
            .inject_into(value);
    }
}
