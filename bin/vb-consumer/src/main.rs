//! VoiceBridge Consumer
//!
//! Binds a durable queue to the broker's topic exchange, forwards
//! transcription events to the agent backend, and publishes correlated
//! replies. Survives broker outages by reconnecting with backoff and
//! exposes live statistics over HTTP.
//!
//! Configuration comes from a TOML file (see `AppConfig::example_toml()`)
//! with `VOICEBRIDGE_*` environment overrides.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use vb_common::ConsumerStats;
use vb_config::{AppConfig, ConsumerSettings};
use vb_consumer::agent::{AgentReplyHandler, HttpAgent, HttpAgentConfig};
use vb_consumer::{Agent, ConsumerConfig, TopicConsumer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    vb_common::logging::init_logging("vb-consumer");

    info!("Starting VoiceBridge consumer");

    let config = AppConfig::load()?;

    let consumer = TopicConsumer::new(consumer_config(&config.consumer));

    let agent: Arc<dyn Agent> = Arc::new(HttpAgent::new(HttpAgentConfig {
        base_url: config.agent.base_url.clone(),
        request_timeout: Duration::from_secs(config.agent.request_timeout_secs),
    }));
    consumer.register_handler("transcription", Arc::new(AgentReplyHandler::new(agent)));

    if !consumer.enabled() {
        warn!("Consumer disabled by configuration - serving stats only");
    } else if consumer.connect().await {
        if let Err(e) = consumer.start_consuming().await {
            error!(error = %e, "Failed to start consuming");
        }
    } else {
        warn!("Initial broker connect failed - retrying in the background");
    }

    // Status API
    let app = status_router(consumer.clone()).layer(TraceLayer::new_for_http());
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Status server listening");

    let server_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Status server error");
        }
    });

    info!("VoiceBridge consumer started. Press Ctrl+C to shutdown.");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    consumer.disconnect().await;
    server_task.abort();

    info!("VoiceBridge consumer shutdown complete");
    Ok(())
}

fn consumer_config(settings: &ConsumerSettings) -> ConsumerConfig {
    ConsumerConfig {
        url: settings.url.clone(),
        exchange: settings.exchange.clone(),
        queue_name: settings.queue_name.clone(),
        routing_key: settings.routing_key.clone(),
        durable: settings.durable,
        auto_delete: settings.auto_delete,
        prefetch_count: settings.prefetch_count,
        reconnect_interval: Duration::from_secs(settings.reconnect_interval_secs),
        max_reconnect_attempts: settings.max_reconnect_attempts,
        enabled: settings.enabled,
        ..Default::default()
    }
}

fn status_router(consumer: Arc<TopicConsumer>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(consumer)
}

async fn health(State(consumer): State<Arc<TopicConsumer>>) -> Json<serde_json::Value> {
    let stats = consumer.stats();
    Json(serde_json::json!({
        "status": if stats.connected || !stats.enabled { "ok" } else { "degraded" },
        "connected": stats.connected,
        "consuming": stats.consuming,
    }))
}

async fn stats(State(consumer): State<Arc<TopicConsumer>>) -> Json<ConsumerStats> {
    Json(consumer.stats())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
