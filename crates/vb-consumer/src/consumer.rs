//! Topic-queue consumer
//!
//! Ties the connection manager, handler registry, message pump, stats and
//! reconnect scheduler into one consumer instance:
//! - queue binding and one-at-a-time consumption (bounded by prefetch)
//! - exactly one acknowledgement per delivery
//! - automatic reconnection with linear backoff, resuming consumption
//! - graceful shutdown releasing subscription, channel, connection in order

use futures::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicCancelOptions, BasicConsumeOptions},
    types::FieldTable,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use vb_common::ConsumerStats;

use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::ConsumerError;
use crate::pump::{DeliveryContext, MessagePump};
use crate::publisher::AmqpReplyPublisher;
use crate::reconnect::ReconnectScheduler;
use crate::registry::HandlerRegistry;
use crate::stats::StatsCollector;
use crate::{ConsumerConfig, MessageHandler, ReplyPublisher, Result};

/// How long stop_consuming waits for the consume task to drain after cancel
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TopicConsumer {
    config: ConsumerConfig,
    connection: Arc<ConnectionManager>,
    registry: Arc<HandlerRegistry>,
    stats: Arc<StatsCollector>,
    pump: Arc<MessagePump>,
    reconnect: ReconnectScheduler,
    consuming: AtomicBool,
    resume_on_reconnect: AtomicBool,
    consume_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TopicConsumer {
    /// Build a consumer publishing replies over its own channel.
    pub fn new(config: ConsumerConfig) -> Arc<Self> {
        let stats = Arc::new(StatsCollector::new());
        let connection = Arc::new(ConnectionManager::new(config.clone(), stats.clone()));
        let publisher: Arc<dyn ReplyPublisher> =
            Arc::new(AmqpReplyPublisher::new(connection.clone()));
        Self::with_publisher(config, publisher, stats, connection)
    }

    fn with_publisher(
        config: ConsumerConfig,
        publisher: Arc<dyn ReplyPublisher>,
        stats: Arc<StatsCollector>,
        connection: Arc<ConnectionManager>,
    ) -> Arc<Self> {
        let registry = Arc::new(HandlerRegistry::new());
        let pump = Arc::new(MessagePump::new(
            registry.clone(),
            publisher,
            stats.clone(),
        ));
        let reconnect =
            ReconnectScheduler::new(config.reconnect_interval, config.max_reconnect_attempts);

        Arc::new(Self {
            config,
            connection,
            registry,
            stats,
            pump,
            reconnect,
            consuming: AtomicBool::new(false),
            resume_on_reconnect: AtomicBool::new(false),
            consume_task: tokio::sync::Mutex::new(None),
        })
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Register a handler for an event type. Last registration wins.
    /// Registration must happen before consumption starts.
    pub fn register_handler(&self, event_type: &str, handler: Arc<dyn MessageHandler>) {
        self.registry.register(event_type, handler);
    }

    /// Connect to the broker.
    ///
    /// Returns true when connected (no-op if already connected), false when
    /// disabled or when the attempt failed; failures arm the reconnect
    /// scheduler so the consumer keeps retrying in the background up to the
    /// configured attempt bound.
    pub async fn connect(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            return false;
        }

        match self.connection.connect().await {
            Ok(connected) => {
                if connected {
                    self.reconnect.reset();
                }
                connected
            }
            Err(e) => {
                error!(error = %e, "Failed to connect consumer");
                self.schedule_reconnect();
                false
            }
        }
    }

    /// Subscribe to the bound queue and start the consume loop.
    ///
    /// Requires a connected state; idempotent while already consuming.
    pub async fn start_consuming(self: &Arc<Self>) -> Result<()> {
        if !self.config.enabled {
            warn!("Cannot start consuming: consumer is disabled");
            return Err(ConsumerError::Disabled);
        }

        if !self.connection.is_connected() {
            warn!("Cannot start consuming: not connected");
            return Err(ConsumerError::NotConnected);
        }

        if self.consuming.swap(true, Ordering::SeqCst) {
            debug!("Already consuming messages");
            return Ok(());
        }

        let channel = match self.connection.channel().await {
            Some(channel) => channel,
            None => {
                self.consuming.store(false, Ordering::SeqCst);
                return Err(ConsumerError::NotConnected);
            }
        };

        let consumer = match channel
            .basic_consume(
                &self.config.queue_name,
                &self.config.consumer_tag,
                BasicConsumeOptions {
                    no_ack: false, // We need manual ack
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                self.consuming.store(false, Ordering::SeqCst);
                return Err(ConsumerError::Connection(format!(
                    "failed to start consuming: {}",
                    e
                )));
            }
        };

        self.connection.set_state(ConnectionState::Consuming);
        info!(queue = %self.config.queue_name, "Started consuming messages");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.consume_loop(consumer).await });
        *self.consume_task.lock().await = Some(handle);

        Ok(())
    }

    /// Cancel the subscription by consumer tag. No-op if not consuming.
    pub async fn stop_consuming(&self) {
        if !self.consuming.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping message consumption");

        // The connection may already be gone; cancel failure is not fatal.
        if let Some(channel) = self.connection.channel().await {
            if let Err(e) = channel
                .basic_cancel(&self.config.consumer_tag, BasicCancelOptions::default())
                .await
            {
                warn!(error = %e, "Error cancelling consumer");
            }
        }

        if let Some(mut handle) = self.consume_task.lock().await.take() {
            if tokio::time::timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
                warn!("Consume task did not exit after cancel, aborting");
                handle.abort();
            }
        }

        if matches!(self.connection.state(), ConnectionState::Consuming) {
            self.connection.set_state(ConnectionState::Connected);
        }

        info!("Stopped consuming messages");
    }

    /// Full teardown: reconnect timer, subscription, channel, connection.
    /// Safe to call from any state; never raises.
    pub async fn disconnect(&self) {
        self.reconnect.cancel();
        self.resume_on_reconnect.store(false, Ordering::SeqCst);
        self.stop_consuming().await;
        self.connection.disconnect().await;
    }

    /// Snapshot current counters and state.
    pub fn stats(&self) -> ConsumerStats {
        let state = self.connection.state();
        ConsumerStats {
            messages_received: self.stats.received(),
            messages_processed: self.stats.processed(),
            messages_failed: self.stats.failed(),
            connection_errors: self.stats.connection_errors(),
            last_message_time: self.stats.last_message_time(),
            connected: matches!(
                state,
                ConnectionState::Connected | ConnectionState::Consuming
            ),
            consuming: matches!(state, ConnectionState::Consuming),
            enabled: self.config.enabled,
            queue_name: self.config.queue_name.clone(),
            routing_key: self.config.routing_key.clone(),
        }
    }

    async fn consume_loop(self: Arc<Self>, mut consumer: lapin::Consumer) {
        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => {
                    let ctx = DeliveryContext {
                        reply_to: delivery
                            .properties
                            .reply_to()
                            .as_ref()
                            .map(|s| s.to_string()),
                        correlation_id: delivery
                            .properties
                            .correlation_id()
                            .as_ref()
                            .map(|s| s.to_string()),
                    };

                    self.pump.dispatch(&delivery.data, ctx).await;

                    // Exactly one settlement per delivery, whatever the
                    // dispatch outcome.
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        warn!(error = %e, "Failed to ack delivery");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Error receiving delivery");
                    break;
                }
            }
        }

        // The stream ends on basic_cancel (intentional) or when the broker
        // goes away. Only the latter leaves the consuming flag set.
        if self.consuming.swap(false, Ordering::SeqCst) {
            warn!(queue = %self.config.queue_name, "Consume stream ended unexpectedly");
            self.stats.record_connection_error();
            self.resume_on_reconnect.store(true, Ordering::SeqCst);
            self.connection.mark_disconnected().await;
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let Some(delay) = self.reconnect.arm() else {
            return;
        };

        info!(
            attempt = self.reconnect.attempts(),
            delay_secs = delay.as_secs_f64(),
            "Scheduling reconnection"
        );

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.reconnect.disarm();
            if this.reconnect.is_cancelled() {
                return;
            }

            // A failed connect arms the next attempt itself.
            if this.connect().await && this.resume_on_reconnect.swap(false, Ordering::SeqCst) {
                if let Err(e) = this.start_consuming().await {
                    error!(error = %e, "Failed to resume consumption after reconnect");
                    this.resume_on_reconnect.store(true, Ordering::SeqCst);
                    this.schedule_reconnect();
                }
            }
        });
        self.reconnect.set_timer(handle);
    }
}
