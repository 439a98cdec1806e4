//! Stream event protocol: typed event + envelope + validation.
//!
//! This crate defines the wire shape of one streaming event emitted by the
//! engine's `stream_query` path: a tagged union over
//! `status | metadata | token | sources | error | done`, plus the envelope
//! fields (`correlation_id`, `timestamp`) that are injected per stream.
//! It does not depend on the engine crate; the engine validates each event
//! with [`StreamEvent::validate`] before yielding it to the consumer.

pub mod envelope;
pub mod event;

pub use envelope::{Envelope, EnvelopeState};
pub use event::{ErrorData, EventValidationError, StreamEvent};
