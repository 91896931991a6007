//! Binary wire format shared by the weather sensors, the ingestor and the simulator.
//!
//! A reading travels as a small protobuf-encoded message (device id, value, timestamp),
//! optionally wrapped in a text-safe [`Envelope`] when the transport cannot carry raw bytes.

mod codec;
mod envelope;
mod kind;

pub use codec::{decode, encode, DecodeError, Reading};
pub use envelope::{Envelope, EnvelopeError};
pub use kind::{MetricKind, UnknownKind};
