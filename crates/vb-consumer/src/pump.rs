//! Message dispatch - the per-delivery hot path
//!
//! Decodes a delivery body, routes it to the registered handler, and
//! publishes a correlated reply when the handler produced one and the
//! delivery carried a reply target. Every exit path maps to exactly one
//! acknowledgement decision made by the consume loop: malformed,
//! unroutable, and failed messages are all dropped rather than requeued,
//! so a poison message can never loop forever.

use std::sync::Arc;
use tracing::{debug, error, warn};

use vb_common::EventEnvelope;

use crate::registry::HandlerRegistry;
use crate::stats::StatsCollector;
use crate::ReplyPublisher;

/// Transport-level reply metadata extracted from the delivery properties
#[derive(Debug, Clone, Default)]
pub struct DeliveryContext {
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

/// What happened to a single delivery. All variants are acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Processed,
    DecodeFailed,
    Unroutable(String),
    HandlerFailed(String),
}

pub struct MessagePump {
    registry: Arc<HandlerRegistry>,
    publisher: Arc<dyn ReplyPublisher>,
    stats: Arc<StatsCollector>,
}

impl MessagePump {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        publisher: Arc<dyn ReplyPublisher>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            registry,
            publisher,
            stats,
        }
    }

    /// Process one delivery body to completion.
    pub async fn dispatch(&self, body: &[u8], ctx: DeliveryContext) -> DispatchOutcome {
        self.stats.record_received();

        let envelope: EventEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Failed to decode message body");
                self.stats.record_failed();
                return DispatchOutcome::DecodeFailed;
            }
        };

        debug!(event_type = %envelope.event_type, "Received message");

        let handler = match self.registry.lookup(&envelope.event_type) {
            Some(handler) => handler,
            None => {
                warn!(
                    event_type = %envelope.event_type,
                    "No handler registered for event type"
                );
                self.stats.record_failed();
                return DispatchOutcome::Unroutable(envelope.event_type);
            }
        };

        let response = match handler.handle(&envelope).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    event_type = %envelope.event_type,
                    error = %e,
                    "Handler failed"
                );
                self.stats.record_failed();
                return DispatchOutcome::HandlerFailed(e.to_string());
            }
        };

        if let (Some(response), Some(reply_to)) = (response.as_ref(), ctx.reply_to.as_deref()) {
            // The original correlation id passes through unchanged.
            let sent = self
                .publisher
                .publish(reply_to, response, ctx.correlation_id.as_deref())
                .await;
            if sent {
                debug!(reply_to = %reply_to, "Sent reply");
            } else {
                warn!(reply_to = %reply_to, "Failed to publish reply");
            }
        }

        self.stats.record_processed();
        debug!(event_id = ?envelope.event_id, "Processed message");

        DispatchOutcome::Processed
    }
}
