mod config;
mod db;
mod errors;
mod metrics;
mod model;
mod mqtt;
mod rest;
mod router;
mod store;
mod validate;

use axum::{routing::get, Router};
use config::{Config, StoreBackend};
use std::sync::Arc;
use store::{MemoryReadingStore, SharedStore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Starting weather ingestor");
    info!("MQTT broker: {}:{}", config.mqtt_broker, config.mqtt_port);
    info!("HTTP server: {}", config.http_addr);
    info!("Payload envelope: {}", config.envelope);
    for kind in wire::MetricKind::ALL {
        match config.tables.get(kind) {
            Ok(table) => info!("{} table: {}", kind, table),
            Err(e) => warn!("{}; {} readings will be rejected", e, kind),
        }
    }

    // Initialize metrics
    metrics::init_metrics();

    if let Err(e) = run(config).await {
        error!("Ingestor failed: {}", e);
        std::process::exit(1);
    }

    info!("Shutting down");
}

async fn run(config: Config) -> errors::Result<()> {
    // One store handle for the whole process, shared by every handler
    let store: SharedStore = match config.store_backend {
        StoreBackend::Postgres => {
            info!("Database: {}", config.database_host());
            let pool = db::make_pool(&config.database_url, config.db_pool_size).await?;
            let store = db::PgReadingStore::new(pool, config.tables.clone());
            store.ensure_tables().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; readings are lost on restart");
            Arc::new(MemoryReadingStore::new(config.tables.clone()))
        }
    };

    let mqtt_handle = if config.enable_mqtt {
        let settings = mqtt::MqttSettings {
            broker: config.mqtt_broker.clone(),
            port: config.mqtt_port,
            client_id: format!("ingestor-{}", uuid::Uuid::new_v4()),
            topic_prefix: config.mqtt_topic_prefix.clone(),
            max_retries: config.ingest_max_retries,
        };
        let router = router::IngestRouter::new(store.clone(), config.envelope);
        Some(tokio::spawn(async move {
            if let Err(e) = mqtt::run_mqtt(settings, router).await {
                error!("MQTT task failed: {}", e);
            }
        }))
    } else {
        info!("MQTT listener disabled");
        None
    };

    // Build HTTP app with REST API and metrics endpoint
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(store, config.envelope));

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    let mqtt_task = async {
        match mqtt_handle {
            Some(handle) => {
                let _ = handle.await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = mqtt_task => {
            error!("MQTT task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
