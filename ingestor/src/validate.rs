use crate::errors::IngestError;
use wire::{MetricKind, Reading};

const TEMP_MIN: f32 = -50.0;
const TEMP_MAX: f32 = 100.0;
const HUMIDITY_MIN: f32 = 0.0;
const HUMIDITY_MAX: f32 = 100.0;

/// Validates a decoded reading against the physical range of its kind
pub fn validate(kind: MetricKind, reading: &Reading) -> Result<(), IngestError> {
    let invalid = |reason: String| IngestError::Invalid { kind, reason };

    if reading.device_id.is_empty() {
        return Err(invalid("Device ID cannot be empty".to_string()));
    }

    if !reading.value.is_finite() {
        return Err(invalid(format!("Value {} is not finite", reading.value)));
    }

    let (min, max) = match kind {
        MetricKind::Temperature => (TEMP_MIN, TEMP_MAX),
        MetricKind::Humidity => (HUMIDITY_MIN, HUMIDITY_MAX),
    };
    if reading.value < min || reading.value > max {
        return Err(invalid(format!(
            "Value {} out of range [{}, {}]",
            reading.value, min, max
        )));
    }

    Ok(())
}
