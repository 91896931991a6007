use crate::MetricKind;
use prost::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One decoded sensor measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed {kind} payload: {reason}")]
    Malformed { kind: MetricKind, reason: String },
}

impl DecodeError {
    fn malformed(kind: MetricKind, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}

// Field presence is tracked explicitly so a payload cut between two fields is
// rejected instead of decoding to zero values. Only `value` may be absent: proto3
// publishers leave a 0.0 reading off the wire.
#[derive(Clone, PartialEq, Message)]
struct WireReading {
    #[prost(string, optional, tag = "1")]
    device_id: Option<String>,
    #[prost(float, optional, tag = "2")]
    value: Option<f32>,
    #[prost(uint64, optional, tag = "3")]
    timestamp: Option<u64>,
}

/// Decodes a fully unwrapped binary payload for `kind`.
///
/// Temperature and humidity share one message layout, so `kind` only scopes the error.
pub fn decode(kind: MetricKind, bytes: &[u8]) -> Result<Reading, DecodeError> {
    let wire = WireReading::decode(bytes).map_err(|e| DecodeError::malformed(kind, e.to_string()))?;

    let device_id = wire
        .device_id
        .ok_or_else(|| DecodeError::malformed(kind, "missing device_id"))?;
    if device_id.is_empty() {
        return Err(DecodeError::malformed(kind, "empty device_id"));
    }
    let value = wire.value.unwrap_or_default();
    let timestamp = wire
        .timestamp
        .ok_or_else(|| DecodeError::malformed(kind, "missing timestamp"))?;
    if timestamp > i64::MAX as u64 {
        return Err(DecodeError::malformed(
            kind,
            format!("timestamp {} out of range", timestamp),
        ));
    }

    Ok(Reading {
        device_id,
        timestamp,
        value,
    })
}

/// Encodes a reading, always emitting all three fields.
pub fn encode(reading: &Reading) -> Vec<u8> {
    WireReading {
        device_id: Some(reading.device_id.clone()),
        value: Some(reading.value),
        timestamp: Some(reading.timestamp),
    }
    .encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Reading {
        Reading {
            device_id: "temperature_sensor_1".to_string(),
            timestamp: 1_754_243_063_995,
            value: 21.5,
        }
    }

    #[test]
    fn test_round_trip() {
        let readings = [
            reading(),
            Reading {
                device_id: "d".to_string(),
                timestamp: 0,
                value: 0.0,
            },
            Reading {
                device_id: "датчик-7".to_string(),
                timestamp: i64::MAX as u64,
                value: -40.25,
            },
        ];

        for r in readings {
            let bytes = encode(&r);
            assert_eq!(decode(MetricKind::Temperature, &bytes).unwrap(), r);
        }
    }

    #[test]
    fn test_decode_device_fixture() {
        // Humidity message as published by a field device.
        let mut bytes = vec![10, 17];
        bytes.extend_from_slice(b"humidity_sensor_1");
        bytes.extend_from_slice(&[21, 0, 0, 52, 66, 24, 187, 193, 163, 136, 135, 51]);

        let decoded = decode(MetricKind::Humidity, &bytes).unwrap();
        assert_eq!(decoded.device_id, "humidity_sensor_1");
        assert_eq!(decoded.value, 45.0);
        assert_eq!(decoded.timestamp, 1_754_243_063_995);
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn test_every_truncated_prefix_is_malformed() {
        let bytes = encode(&reading());
        for len in 0..bytes.len() {
            let result = decode(MetricKind::Temperature, &bytes[..len]);
            assert!(
                matches!(result, Err(DecodeError::Malformed { .. })),
                "prefix of {} bytes decoded: {:?}",
                len,
                result
            );
        }
    }

    #[test]
    fn test_length_prefix_overrun() {
        // device_id claims 200 bytes but only 3 follow
        let bytes = [10, 200, 1, b'a', b'b', b'c'];
        assert!(decode(MetricKind::Humidity, &bytes).is_err());
    }

    #[test]
    fn test_zero_value_omitted_by_publisher() {
        // Proto3 drops the zero float, leaving only tags 1 and 3
        let mut bytes = vec![10, 20];
        bytes.extend_from_slice(b"temperature_sensor_1");
        bytes.extend_from_slice(&[24, 187, 193, 163, 136, 135, 51]);

        let decoded = decode(MetricKind::Temperature, &bytes).unwrap();
        assert_eq!(
            decoded,
            Reading {
                device_id: "temperature_sensor_1".to_string(),
                timestamp: 1_754_243_063_995,
                value: 0.0,
            }
        );
    }

    #[test]
    fn test_missing_fields() {
        let no_timestamp = WireReading {
            device_id: Some("dev-1".to_string()),
            value: Some(1.0),
            timestamp: None,
        }
        .encode_to_vec();
        let err = decode(MetricKind::Humidity, &no_timestamp).unwrap_err();
        assert!(err.to_string().contains("missing timestamp"));

        let no_device = WireReading {
            device_id: None,
            value: Some(1.0),
            timestamp: Some(1),
        }
        .encode_to_vec();
        let err = decode(MetricKind::Humidity, &no_device).unwrap_err();
        assert!(err.to_string().contains("missing device_id"));

        let empty_id = WireReading {
            device_id: Some(String::new()),
            value: Some(1.0),
            timestamp: Some(1),
        }
        .encode_to_vec();
        assert!(decode(MetricKind::Humidity, &empty_id).is_err());
    }

    #[test]
    fn test_timestamp_out_of_range() {
        let bytes = WireReading {
            device_id: Some("dev-1".to_string()),
            value: Some(1.0),
            timestamp: Some(u64::MAX),
        }
        .encode_to_vec();
        assert!(decode(MetricKind::Temperature, &bytes).is_err());
    }
}
