use crate::errors::IngestError;
use crate::metrics::{
    INGEST_LATENCY_SECONDS, MESSAGES_TOTAL, REJECTED_MESSAGES_TOTAL, STORED_READINGS_TOTAL,
};
use crate::store::SharedStore;
use crate::validate::validate;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use wire::{Envelope, MetricKind, Reading};

/// Routes one inbound payload to the decoder and the store for its metric kind.
///
/// Holds no per-message state; clones share the same store handle.
#[derive(Clone)]
pub struct IngestRouter {
    store: SharedStore,
    envelope: Envelope,
}

impl IngestRouter {
    pub fn new(store: SharedStore, envelope: Envelope) -> Self {
        Self { store, envelope }
    }

    /// Resolves the routing key, decodes the payload and writes the reading.
    ///
    /// Nothing is written unless the payload decodes and validates.
    pub async fn handle(&self, routing_key: &str, payload: &[u8]) -> Result<Reading, IngestError> {
        let (kind, reading) = self.prepare(routing_key, payload)?;
        self.store_reading(kind, &reading).await?;
        Ok(reading)
    }

    /// Everything before the write: kind resolution, unwrap, decode and validation.
    pub(crate) fn prepare(
        &self,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(MetricKind, Reading), IngestError> {
        MESSAGES_TOTAL.inc();

        let kind: MetricKind = routing_key.parse().map_err(|e| {
            warn!(routing_key, "Dropping message for unknown metric kind");
            REJECTED_MESSAGES_TOTAL.with_label_values(&["unknown_kind"]).inc();
            IngestError::UnknownKind(e)
        })?;

        let reading = self.decode(kind, payload)?;
        Ok((kind, reading))
    }

    fn decode(&self, kind: MetricKind, payload: &[u8]) -> Result<Reading, IngestError> {
        let bytes = self.envelope.unwrap(payload).map_err(|e| {
            warn!(%kind, envelope = %self.envelope, payload_len = payload.len(), error = %e, "Failed to unwrap payload");
            REJECTED_MESSAGES_TOTAL.with_label_values(&["envelope"]).inc();
            e
        })?;

        let reading = wire::decode(kind, &bytes).map_err(|e| {
            warn!(%kind, payload_len = bytes.len(), error = %e, "Failed to decode reading");
            REJECTED_MESSAGES_TOTAL.with_label_values(&["decode"]).inc();
            e
        })?;

        validate(kind, &reading).map_err(|e| {
            warn!(%kind, device_id = %reading.device_id, error = %e, "Rejected reading");
            REJECTED_MESSAGES_TOTAL.with_label_values(&["invalid"]).inc();
            e
        })?;

        Ok(reading)
    }

    pub(crate) async fn store_reading(
        &self,
        kind: MetricKind,
        reading: &Reading,
    ) -> Result<(), IngestError> {
        let start = Instant::now();

        if let Err(e) = self.store.put(kind, reading).await {
            error!(%kind, device_id = %reading.device_id, timestamp = reading.timestamp, error = %e, "Failed to store reading");
            return Err(e.into());
        }

        INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        STORED_READINGS_TOTAL.with_label_values(&[kind.resource()]).inc();
        debug!(
            "Stored {} reading from {} at {}: {}",
            kind, reading.device_id, reading.timestamp, reading.value
        );
        Ok(())
    }
}
