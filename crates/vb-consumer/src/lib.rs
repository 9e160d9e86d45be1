//! Durable topic-queue consumer with automatic reconnection and
//! handler-based message dispatch.
//!
//! A [`TopicConsumer`] binds a durable queue to a topic exchange, consumes
//! messages one at a time bounded by prefetch, routes each body to the
//! handler registered for its `event_type`, and publishes a correlated
//! reply when the handler produced one. Broker outages are survived by
//! linear-backoff reconnection up to a configured attempt bound; live
//! counters are exposed as [`vb_common::ConsumerStats`] snapshots.

use async_trait::async_trait;
use vb_common::EventEnvelope;

pub mod agent;
pub mod config;
pub mod connection;
pub mod error;
pub mod pump;
pub mod publisher;
pub mod reconnect;
pub mod registry;
pub mod stats;

mod consumer;

pub use config::ConsumerConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use consumer::TopicConsumer;
pub use error::ConsumerError;
pub use pump::{DeliveryContext, DispatchOutcome, MessagePump};
pub use publisher::AmqpReplyPublisher;
pub use reconnect::ReconnectScheduler;
pub use registry::HandlerRegistry;
pub use stats::StatsCollector;

pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Asynchronous handler for one event type.
///
/// Returning `Some(value)` asks the pump to publish `value` as a reply
/// when the delivery carried a reply target. Errors are counted as failed
/// messages; the delivery is still acknowledged and never redelivered by
/// this layer, so handlers own any retry policy they need.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<Option<serde_json::Value>>;
}

/// Publishes a reply payload toward a routing key.
///
/// Returns false on any failure; reply publishing is best-effort and must
/// never fail the message that produced the reply.
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    async fn publish(
        &self,
        routing_key: &str,
        payload: &serde_json::Value,
        correlation_id: Option<&str>,
    ) -> bool;
}

/// External agent collaborator: turns a prompt into an optional answer.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn call(&self, text: &str, session_id: Option<&str>) -> anyhow::Result<Option<String>>;
}
