//! Broker connection management via AMQP
//!
//! Owns the lapin connection and channel and the consumer's connection
//! state. Connect performs the full topology handshake:
//! - open connection and channel
//! - set QoS to the configured prefetch
//! - resolve the topic exchange by passive declare (never creates it)
//! - declare the queue with configured durability/auto-delete
//! - bind queue to exchange with the routing key
//!
//! Disconnect releases resources in reverse-acquisition order and never
//! propagates teardown errors to the caller.

use lapin::{
    options::{BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ConsumerError;
use crate::stats::StatsCollector;
use crate::{ConsumerConfig, Result};

/// Lifecycle state of the consumer's broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Fixed at construction when the consumer is configured off
    Disabled,
    Disconnected,
    Connecting,
    Connected,
    Consuming,
}

pub struct ConnectionManager {
    config: ConsumerConfig,
    state: parking_lot::RwLock<ConnectionState>,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
    stats: Arc<StatsCollector>,
}

impl ConnectionManager {
    pub fn new(config: ConsumerConfig, stats: Arc<StatsCollector>) -> Self {
        let initial_state = if config.enabled {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Disabled
        };

        Self {
            config,
            state: parking_lot::RwLock::new(initial_state),
            connection: RwLock::new(None),
            channel: RwLock::new(None),
            stats,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Consuming
        )
    }

    /// Current channel, if connected
    pub async fn channel(&self) -> Option<Channel> {
        self.channel.read().await.clone()
    }

    /// Connect to the broker and set up queue bindings.
    ///
    /// Returns `Ok(false)` when the consumer is disabled, `Ok(true)` when
    /// connected (including the already-connected no-op). Any failure
    /// counts one connection error, leaves the state `Disconnected`, and
    /// surfaces as `Err` for the caller to schedule a reconnect.
    pub async fn connect(&self) -> Result<bool> {
        if matches!(self.state(), ConnectionState::Disabled) {
            return Ok(false);
        }

        if self.is_connected() {
            debug!("Already connected to broker");
            return Ok(true);
        }

        self.set_state(ConnectionState::Connecting);
        info!(url = %self.config.url, queue = %self.config.queue_name, "Connecting to broker");

        match self.try_connect().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                info!(
                    queue = %self.config.queue_name,
                    routing_key = %self.config.routing_key,
                    "Connected to broker"
                );
                Ok(true)
            }
            Err(e) => {
                self.stats.record_connection_error();
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn try_connect(&self) -> Result<()> {
        let connection = Connection::connect(
            &self.config.url,
            ConnectionProperties::default()
                .with_connection_name(self.config.consumer_tag.as_str().into()),
        )
        .await
        .map_err(|e| ConsumerError::Connection(format!("broker connect failed: {}", e)))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ConsumerError::Connection(format!("failed to create channel: {}", e)))?;

        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| ConsumerError::Connection(format!("failed to set QoS: {}", e)))?;

        // The exchange must pre-exist; a passive declare only asserts that.
        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                ConsumerError::Connection(format!(
                    "exchange {} not available: {}",
                    self.config.exchange, e
                ))
            })?;

        channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions {
                    durable: self.config.durable,
                    auto_delete: self.config.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ConsumerError::Connection(format!("failed to declare queue: {}", e)))?;

        channel
            .queue_bind(
                &self.config.queue_name,
                &self.config.exchange,
                &self.config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ConsumerError::Connection(format!("failed to bind queue: {}", e)))?;

        *self.connection.write().await = Some(connection);
        *self.channel.write().await = Some(channel);

        Ok(())
    }

    /// Drop the connection objects after the broker went away underneath us.
    pub async fn mark_disconnected(&self) {
        *self.channel.write().await = None;
        *self.connection.write().await = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Close channel then connection. Teardown errors are logged, never raised.
    pub async fn disconnect(&self) {
        if matches!(
            self.state(),
            ConnectionState::Disconnected | ConnectionState::Disabled
        ) {
            return;
        }

        info!("Disconnecting from broker");

        if let Some(channel) = self.channel.write().await.take() {
            if let Err(e) = channel.close(200, "shutdown").await {
                warn!(error = %e, "Error closing channel");
            }
        }

        if let Some(connection) = self.connection.write().await.take() {
            if let Err(e) = connection.close(200, "shutdown").await {
                warn!(error = %e, "Error closing connection");
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected from broker");
    }
}
