//! AMQP reply publisher
//!
//! Publishes handler responses to the broker's default exchange, which
//! routes directly to the queue named by the delivery's `reply_to`. The
//! correlation id rides in the message properties so the requester can
//! match the response; it is never embedded in the JSON body.

use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, BasicProperties};
use std::sync::Arc;
use tracing::{error, warn};

use crate::connection::ConnectionManager;
use crate::ReplyPublisher;

pub struct AmqpReplyPublisher {
    connection: Arc<ConnectionManager>,
}

impl AmqpReplyPublisher {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl ReplyPublisher for AmqpReplyPublisher {
    async fn publish(
        &self,
        routing_key: &str,
        payload: &serde_json::Value,
        correlation_id: Option<&str>,
    ) -> bool {
        let Some(channel) = self.connection.channel().await else {
            warn!(routing_key = %routing_key, "Cannot publish reply: not connected");
            return false;
        };

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Failed to encode reply payload");
                return false;
            }
        };

        let mut properties = BasicProperties::default()
            .with_delivery_mode(2) // Persistent
            .with_content_type("application/json".into());
        if let Some(id) = correlation_id {
            properties = properties.with_correlation_id(id.into());
        }

        let confirm = channel
            .basic_publish(
                "", // Default exchange
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await;

        match confirm {
            Ok(confirm) => match confirm.await {
                Ok(_) => true,
                Err(e) => {
                    error!(routing_key = %routing_key, error = %e, "Reply publish confirm failed");
                    false
                }
            },
            Err(e) => {
                error!(routing_key = %routing_key, error = %e, "Reply publish failed");
                false
            }
        }
    }
}
