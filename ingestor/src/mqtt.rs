use crate::errors::{Error, IngestError, Result};
use crate::router::IngestRouter;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, error, info, warn};
use wire::{MetricKind, Reading};

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;

pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub topic_prefix: String,
    pub max_retries: u32,
}

pub async fn run_mqtt(settings: MqttSettings, router: IngestRouter) -> Result<()> {
    info!(
        "Connecting to MQTT broker at {}:{}",
        settings.broker, settings.port
    );

    let mut mqtt_options = MqttOptions::new(
        settings.client_id.clone(),
        settings.broker.clone(),
        settings.port,
    );
    mqtt_options.set_keep_alive(std::time::Duration::from_secs(30));
    mqtt_options.set_clean_session(false);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10000);

    // One level per metric kind, QoS 1 for at-least-once delivery
    let topic = format!("{}/+", settings.topic_prefix);
    client
        .subscribe(topic.as_str(), QoS::AtLeastOnce)
        .await
        .map_err(Error::Mqtt)?;

    info!("Subscribed to {} with QoS 1", topic);

    loop {
        match eventloop.poll().await {
            Ok(notification) => {
                if let Event::Incoming(Packet::Publish(publish)) = notification {
                    debug!(
                        "Received message on topic {}, size: {} bytes",
                        publish.topic,
                        publish.payload.len()
                    );

                    let Some(key) = routing_key(&settings.topic_prefix, &publish.topic) else {
                        warn!(topic = %publish.topic, "Ignoring message outside the telemetry topics");
                        continue;
                    };

                    // Messages are independent; a slow retry must not stall the event loop
                    let router = router.clone();
                    let key = key.to_string();
                    let max_retries = settings.max_retries;
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_with_retry(&router, &key, &publish.payload, max_retries).await
                        {
                            error!(routing_key = %key, error = %e, "Dropping message after failed ingest");
                        }
                    });
                }
            }
            Err(e) => {
                error!("MQTT error: {}", e);
                // rumqttc automatically reconnects, so we just log and continue
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Extracts the metric routing key from `<prefix>/<kind>`.
fn routing_key<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    topic
        .strip_prefix(prefix)?
        .strip_prefix('/')
        .filter(|key| !key.is_empty() && !key.contains('/'))
}

/// Decodes a message once, then retries only writes that hit an unavailable store.
async fn handle_with_retry(
    router: &IngestRouter,
    routing_key: &str,
    payload: &[u8],
    max_retries: u32,
) -> std::result::Result<Reading, IngestError> {
    let (kind, reading) = router.prepare(routing_key, payload)?;
    store_with_retry(router, kind, &reading, max_retries).await?;
    Ok(reading)
}

async fn store_with_retry(
    router: &IngestRouter,
    kind: MetricKind,
    reading: &Reading,
    max_retries: u32,
) -> std::result::Result<(), IngestError> {
    let mut attempt = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match router.store_reading(kind, reading).await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Reading stored on attempt {}", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= max_retries || !e.is_retryable() {
                    return Err(e);
                }

                warn!(
                    "Store write failed (attempt {}/{}): {}. Retrying in {}ms...",
                    attempt, max_retries, e, backoff_ms
                );

                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
