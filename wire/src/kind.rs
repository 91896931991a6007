use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of telemetry categories a sensor can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Temperature,
    Humidity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown metric kind: {0:?}")]
pub struct UnknownKind(pub String);

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::Temperature, MetricKind::Humidity];

    /// Public resource name, used in HTTP paths and as the last MQTT topic segment.
    pub fn resource(self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::Humidity => "humidity",
        }
    }

    /// Name of the environment variable holding this kind's table name.
    pub fn table_env_key(self) -> &'static str {
        match self {
            MetricKind::Temperature => "TEMPERATURE_TABLE_NAME",
            MetricKind::Humidity => "HUMIDITY_TABLE_NAME",
        }
    }

    pub fn topic(self, prefix: &str) -> String {
        format!("{}/{}", prefix, self.resource())
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

impl FromStr for MetricKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(MetricKind::Temperature),
            "humidity" => Ok(MetricKind::Humidity),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}
