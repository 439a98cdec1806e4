//! Validated event emission for the streaming API.
//!
//! Events flow through a small bounded channel (slow consumers slow the
//! producer). Every event is schema-checked before it is yielded; invalid
//! events are replaced by typed `error` events, and after the configured
//! error budget the stream terminates with a final `error` event.

use std::time::Duration;

use serde_json::{json, Value};
use stream_event::{EnvelopeState, StreamEvent};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Stream terminated: consumer gone or error budget exhausted.
#[derive(Debug)]
pub struct StreamAbort;

/// Validating sender half of one query's event stream.
pub struct EventEmitter {
    tx: mpsc::Sender<Value>,
    envelope: EnvelopeState,
    validation_enabled: bool,
    max_errors: u32,
    error_count: u32,
}

impl EventEmitter {
    pub fn new(
        tx: mpsc::Sender<Value>,
        correlation_id: impl Into<String>,
        validation_enabled: bool,
        max_errors: u32,
    ) -> Self {
        Self {
            tx,
            envelope: EnvelopeState::new(correlation_id.into()),
            validation_enabled,
            max_errors,
            error_count: 0,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.envelope.correlation_id
    }

    fn error_event(&self, error_type: &str, message: &str) -> StreamEvent {
        StreamEvent::Error(stream_event::ErrorData {
            error_type: error_type.to_string(),
            message: message.to_string(),
        })
    }

    async fn send_raw(&mut self, event: &StreamEvent) -> Result<(), StreamAbort> {
        let mut value = event.to_value().map_err(|_| StreamAbort)?;
        self.envelope.inject_into(&mut value);
        self.tx.send(value).await.map_err(|_| StreamAbort)
    }

    /// Validates and emits one event. Invalid events become `error` events;
    /// crossing the error budget terminates the stream.
    pub async fn emit(&mut self, event: StreamEvent) -> Result<(), StreamAbort> {
        if self.validation_enabled {
            if let Err(validation) = event.validate() {
                self.error_count += 1;
                warn!(
                    error = %validation,
                    kind = event.kind(),
                    count = self.error_count,
                    "invalid stream event"
                );
                if self.error_count >= self.max_errors {
                    error!("too many invalid stream events, aborting stream");
                    let last = self.error_event(
                        "too_many_errors",
                        "Stream aborted due to too many malformed events",
                    );
                    let _ = self.send_raw(&last).await;
                    return Err(StreamAbort);
                }
                let replacement =
                    self.error_event("validation_error", &format!("Event validation failed: {validation}"));
                return self.send_raw(&replacement).await;
            }
        }
        self.send_raw(&event).await
    }

    /// Emits a `status` event.
    pub async fn status(&mut self, status: &str) -> Result<(), StreamAbort> {
        self.emit(StreamEvent::Status(json!(status))).await
    }

    /// Emits a `metadata` event.
    pub async fn metadata(&mut self, data: Value) -> Result<(), StreamAbort> {
        self.emit(StreamEvent::Metadata(data)).await
    }

    /// Streams text as whitespace-delimited token events with a small
    /// inter-token delay, preserving UX parity with live generation.
    pub async fn stream_text(&mut self, text: &str, delay: Duration) -> Result<(), StreamAbort> {
        for token in text.split_inclusive(char::is_whitespace) {
            if token.is_empty() {
                continue;
            }
            self.emit(StreamEvent::Token(token.to_string())).await?;
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Emits the terminating `done` event.
    pub async fn done(&mut self, data: Value) -> Result<(), StreamAbort> {
        self.emit(StreamEvent::Done(data)).await
    }

    /// Emits a terminal error event (ignores a closed channel).
    pub async fn fatal(&mut self, error_type: &str, message: &str) {
        let event = self.error_event(error_type, message);
        let _ = self.send_raw(&event).await;
    }
}
