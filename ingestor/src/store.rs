use crate::errors::{ConfigError, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use wire::{MetricKind, Reading};

pub const DEFAULT_QUERY_LIMIT: usize = 100;

// Postgres truncates identifiers past this length
const MAX_TABLE_NAME_LEN: usize = 63;

/// Table name per metric kind.
///
/// A kind without a table is not an error until something tries to read or write it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tables {
    temperature: Option<String>,
    humidity: Option<String>,
}

impl Tables {
    pub fn new(
        temperature: Option<String>,
        humidity: Option<String>,
    ) -> Result<Self, ConfigError> {
        let tables = Tables {
            temperature,
            humidity,
        };

        for kind in MetricKind::ALL {
            if let Some(name) = tables.slot(kind) {
                validate_table_name(kind, name)?;
            }
        }

        if let (Some(t), Some(h)) = (&tables.temperature, &tables.humidity) {
            if t == h {
                return Err(ConfigError::SharedTable { name: t.clone() });
            }
        }

        Ok(tables)
    }

    fn slot(&self, kind: MetricKind) -> Option<&str> {
        match kind {
            MetricKind::Temperature => self.temperature.as_deref(),
            MetricKind::Humidity => self.humidity.as_deref(),
        }
    }

    pub fn get(&self, kind: MetricKind) -> Result<&str, ConfigError> {
        self.slot(kind).ok_or(ConfigError::MissingTable {
            key: kind.table_env_key(),
        })
    }

    pub fn configured(&self) -> impl Iterator<Item = (MetricKind, &str)> + '_ {
        MetricKind::ALL
            .into_iter()
            .filter_map(move |kind| self.slot(kind).map(|name| (kind, name)))
    }
}

fn validate_table_name(kind: MetricKind, name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= MAX_TABLE_NAME_LEN;

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidTable {
            key: kind.table_env_key(),
            name: name.to_string(),
        })
    }
}

/// Per-metric, time-ordered reading storage keyed by (`device_id`, `timestamp`).
///
/// Implementations must be safe to share across concurrent ingest and query calls and
/// must not retry failed backend calls themselves.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    fn tables(&self) -> &Tables;

    /// Resolves the table for `kind` without touching the backend.
    fn namespace(&self, kind: MetricKind) -> Result<&str, ConfigError> {
        self.tables().get(kind)
    }

    /// Upserts a reading. An existing reading with the same key is overwritten.
    async fn put(&self, kind: MetricKind, reading: &Reading) -> Result<(), StoreError>;

    /// Returns readings for `device_id` newer than `since_epoch_ms`, ascending by timestamp.
    ///
    /// When more than `limit` readings match, the `limit` most recent are returned.
    async fn query_recent(
        &self,
        kind: MetricKind,
        device_id: &str,
        since_epoch_ms: i64,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError>;
}

pub type SharedStore = Arc<dyn ReadingStore>;

type Series = BTreeMap<(String, u64), f32>;

/// In-process store used for tests and local runs without a database.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    tables: Tables,
    series: RwLock<HashMap<MetricKind, Series>>,
}

impl MemoryReadingStore {
    pub fn new(tables: Tables) -> Self {
        Self {
            tables,
            series: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub async fn len(&self, kind: MetricKind) -> usize {
        self.series
            .read()
            .await
            .get(&kind)
            .map_or(0, |series| series.len())
    }
}

#[async_trait]
impl ReadingStore for MemoryReadingStore {
    fn tables(&self) -> &Tables {
        &self.tables
    }

    async fn put(&self, kind: MetricKind, reading: &Reading) -> Result<(), StoreError> {
        self.namespace(kind)?;

        self.series
            .write()
            .await
            .entry(kind)
            .or_default()
            .insert((reading.device_id.clone(), reading.timestamp), reading.value);
        Ok(())
    }

    async fn query_recent(
        &self,
        kind: MetricKind,
        device_id: &str,
        since_epoch_ms: i64,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        self.namespace(kind)?;

        // Strictly greater than `since_epoch_ms`
        let lower = if since_epoch_ms < 0 {
            0
        } else {
            since_epoch_ms as u64 + 1
        };

        let guard = self.series.read().await;
        let Some(series) = guard.get(&kind) else {
            return Ok(Vec::new());
        };

        let range = (device_id.to_string(), lower)..=(device_id.to_string(), u64::MAX);
        let mut readings: Vec<Reading> = series
            .range(range)
            .rev()
            .take(limit)
            .map(|((device_id, timestamp), value)| Reading {
                device_id: device_id.clone(),
                timestamp: *timestamp,
                value: *value,
            })
            .collect();
        readings.reverse();

        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_760_000_000_000;

    fn both_tables() -> Tables {
        Tables::new(
            Some("TemperatureTable".to_string()),
            Some("HumidityTable".to_string()),
        )
        .unwrap()
    }

    fn reading(device_id: &str, timestamp: u64, value: f32) -> Reading {
        Reading {
            device_id: device_id.to_string(),
            timestamp,
            value,
        }
    }

    fn since(offset_ms: u64) -> i64 {
        (NOW - offset_ms) as i64
    }

    #[test]
    fn test_table_name_validation() {
        assert!(Tables::new(Some("weather_temp".to_string()), None).is_ok());
        assert_eq!(
            Tables::new(Some("temp; DROP TABLE x".to_string()), None),
            Err(ConfigError::InvalidTable {
                key: "TEMPERATURE_TABLE_NAME",
                name: "temp; DROP TABLE x".to_string(),
            })
        );
        assert!(Tables::new(None, Some("1humidity".to_string())).is_err());
        assert!(Tables::new(None, Some("x".repeat(64))).is_err());
        assert_eq!(
            Tables::new(Some("shared".to_string()), Some("shared".to_string())),
            Err(ConfigError::SharedTable {
                name: "shared".to_string()
            })
        );
    }

    #[test]
    fn test_missing_table_names_env_key() {
        let tables = Tables::new(None, Some("HumidityTable".to_string())).unwrap();
        assert_eq!(tables.get(MetricKind::Humidity), Ok("HumidityTable"));
        assert_eq!(
            tables.get(MetricKind::Temperature),
            Err(ConfigError::MissingTable {
                key: "TEMPERATURE_TABLE_NAME"
            })
        );
        assert_eq!(tables.configured().count(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let store = MemoryReadingStore::new(both_tables());
        let kind = MetricKind::Temperature;

        store.put(kind, &reading("dev-1", NOW, 20.0)).await.unwrap();
        store.put(kind, &reading("dev-1", NOW, 21.5)).await.unwrap();

        assert_eq!(store.len(kind).await, 1);
        let readings = store
            .query_recent(kind, "dev-1", since(60_000), DEFAULT_QUERY_LIMIT)
            .await
            .unwrap();
        assert_eq!(readings, vec![reading("dev-1", NOW, 21.5)]);
    }

    #[tokio::test]
    async fn test_query_window_is_exclusive_and_ascending() {
        let store = MemoryReadingStore::new(both_tables());
        let kind = MetricKind::Humidity;

        for (offset, value) in [(5_000, 3.0), (120_000, 1.0), (30_000, 2.0), (60_000, 9.0)] {
            store
                .put(kind, &reading("dev-1", NOW - offset, value))
                .await
                .unwrap();
        }

        let readings = store
            .query_recent(kind, "dev-1", since(60_000), DEFAULT_QUERY_LIMIT)
            .await
            .unwrap();

        // The reading exactly at the boundary is excluded
        assert_eq!(
            readings,
            vec![
                reading("dev-1", NOW - 30_000, 2.0),
                reading("dev-1", NOW - 5_000, 3.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_limit_keeps_most_recent() {
        let store = MemoryReadingStore::new(both_tables());
        let kind = MetricKind::Temperature;

        for i in 0..150u64 {
            store
                .put(kind, &reading("dev-1", NOW - 50_000 + i * 100, i as f32))
                .await
                .unwrap();
        }

        let readings = store
            .query_recent(kind, "dev-1", since(60_000), 100)
            .await
            .unwrap();

        assert_eq!(readings.len(), 100);
        assert_eq!(readings[0].value, 50.0);
        assert_eq!(readings[99].value, 149.0);
        assert!(readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_devices_and_kinds_are_isolated() {
        let store = MemoryReadingStore::new(both_tables());

        store
            .put(MetricKind::Temperature, &reading("dev-1", NOW, 22.0))
            .await
            .unwrap();
        store
            .put(MetricKind::Humidity, &reading("dev-1", NOW, 55.0))
            .await
            .unwrap();
        store
            .put(MetricKind::Temperature, &reading("dev-10", NOW, 30.0))
            .await
            .unwrap();

        let temperature = store
            .query_recent(MetricKind::Temperature, "dev-1", since(60_000), 100)
            .await
            .unwrap();
        let humidity = store
            .query_recent(MetricKind::Humidity, "dev-1", since(60_000), 100)
            .await
            .unwrap();

        assert_eq!(temperature, vec![reading("dev-1", NOW, 22.0)]);
        assert_eq!(humidity, vec![reading("dev-1", NOW, 55.0)]);
    }

    #[tokio::test]
    async fn test_shared_handle_under_concurrent_use() {
        let store: SharedStore = Arc::new(MemoryReadingStore::new(both_tables()));
        let mut handles = Vec::new();

        for device in 0..8u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let device_id = format!("dev-{}", device);
                for i in 0..50u64 {
                    let kind = MetricKind::ALL[(i % 2) as usize];
                    store
                        .put(kind, &reading(&device_id, NOW - 10_000 + i, i as f32))
                        .await
                        .unwrap();
                    store
                        .query_recent(kind, &device_id, since(60_000), DEFAULT_QUERY_LIMIT)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for device in 0..8u64 {
            let device_id = format!("dev-{}", device);
            for kind in MetricKind::ALL {
                let readings = store
                    .query_recent(kind, &device_id, since(60_000), DEFAULT_QUERY_LIMIT)
                    .await
                    .unwrap();
                assert_eq!(readings.len(), 25);
                assert!(readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            }
        }
    }

    #[tokio::test]
    async fn test_unconfigured_kind_is_config_error() {
        let store = MemoryReadingStore::new(Tables::new(None, Some("h".to_string())).unwrap());

        let err = store
            .query_recent(MetricKind::Temperature, "dev-1", 0, 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotConfigured(ConfigError::MissingTable {
                key: "TEMPERATURE_TABLE_NAME"
            })
        ));

        // Zero results is not an error
        let empty = store
            .query_recent(MetricKind::Humidity, "dev-1", 0, 100)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}
