use thiserror::Error;
use wire::{DecodeError, EnvelopeError, MetricKind, UnknownKind};

/// Process-level failures: startup, transport and server plumbing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} name not configured")]
    MissingTable { key: &'static str },

    #[error("{key} value {name:?} is not a valid table name")]
    InvalidTable { key: &'static str, name: String },

    #[error("table {name:?} is configured for more than one metric kind")]
    SharedTable { name: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    NotConfigured(#[from] ConfigError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if crate::db::is_transient_error(&err) {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// Per-message ingest failure. Every variant is terminal for the message it describes.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid {kind} reading: {reason}")]
    Invalid { kind: MetricKind, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Only a transiently unavailable store is worth another write attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Store(StoreError::Unavailable(_)))
    }
}
