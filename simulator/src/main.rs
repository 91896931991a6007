use chrono::Utc;
use clap::Parser;
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tracing::{error, info, warn};
use wire::{Envelope, MetricKind, Reading};

/// Publishes simulated weather readings the way the field sensors do.
#[derive(Debug, Parser)]
#[command(name = "simulator", version)]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    #[arg(long, env = "MQTT_TOPIC_PREFIX", default_value = "monitoring")]
    topic_prefix: String,

    /// Messages per second across all devices
    #[arg(long, env = "RATE", default_value_t = 10)]
    rate: u64,

    /// Devices per metric kind
    #[arg(long, env = "DEVICES", default_value_t = 1)]
    devices: usize,

    /// base64, hex or raw
    #[arg(long, env = "INGEST_ENVELOPE", default_value = "base64")]
    envelope: Envelope,

    /// Stop after this many messages (0 runs forever)
    #[arg(long, default_value_t = 0)]
    count: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting weather simulator");
    info!(
        "Broker: {}:{}, Rate: {} msg/s, Devices per kind: {}, Envelope: {}",
        args.broker, args.port, args.rate, args.devices, args.envelope
    );

    let client_id = format!("sim-{}", uuid::Uuid::new_v4());

    let mut mqtt_options = MqttOptions::new(&client_id, &args.broker, args.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 20000);

    // Spawn eventloop handler
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("Connected to MQTT broker, starting to publish readings");

    let mut rng = rand::thread_rng();
    let mut counter = 0u64;
    let interval = Duration::from_micros(1_000_000 / args.rate.max(1));
    let devices = args.devices.max(1) as u64;

    while args.count == 0 || counter < args.count {
        let kind = MetricKind::ALL[(counter % 2) as usize];
        let device_id = format!("{}_sensor_{}", kind, (counter / 2) % devices + 1);
        let reading = generate_reading(&mut rng, kind, device_id);

        let payload = args.envelope.wrap(&wire::encode(&reading));
        let topic = kind.topic(&args.topic_prefix);

        match client.publish(&topic, QoS::AtLeastOnce, false, payload).await {
            Ok(_) => {
                counter += 1;
                if counter % 1000 == 0 {
                    info!("Published {} messages", counter);
                }
            }
            Err(e) => {
                warn!("Failed to publish to {}: {}", topic, e);
            }
        }

        tokio::time::sleep(interval).await;
    }

    // Give the event loop a moment to flush in-flight publishes
    tokio::time::sleep(Duration::from_secs(1)).await;
    info!("Published {} messages, exiting", counter);
}

fn generate_reading(rng: &mut impl Rng, kind: MetricKind, device_id: String) -> Reading {
    let value = match kind {
        MetricKind::Temperature => rng.gen_range(15.0..35.0),
        MetricKind::Humidity => rng.gen_range(30.0..80.0),
    };

    Reading {
        device_id,
        timestamp: Utc::now().timestamp_millis() as u64,
        value,
    }
}
