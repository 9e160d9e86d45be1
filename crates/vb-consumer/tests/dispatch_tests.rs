//! MessagePump dispatch tests
//!
//! Tests for:
//! - Handler routing by event type, including re-registration
//! - Decode / no-handler / handler-failure drop policies
//! - Reply publishing with correlation id pass-through
//! - Counter bookkeeping: every delivery yields exactly one outcome

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use vb_common::EventEnvelope;
use vb_consumer::{
    DeliveryContext, DispatchOutcome, HandlerRegistry, MessageHandler, MessagePump,
    ReplyPublisher, StatsCollector,
};

/// Publisher that records every call and can simulate failure
struct RecordingPublisher {
    calls: parking_lot::Mutex<Vec<(String, Value, Option<String>)>>,
    succeed: bool,
}

impl RecordingPublisher {
    fn new() -> Self {
        Self {
            calls: parking_lot::Mutex::new(Vec::new()),
            succeed: true,
        }
    }

    fn failing() -> Self {
        Self {
            calls: parking_lot::Mutex::new(Vec::new()),
            succeed: false,
        }
    }

    fn calls(&self) -> Vec<(String, Value, Option<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ReplyPublisher for RecordingPublisher {
    async fn publish(
        &self,
        routing_key: &str,
        payload: &Value,
        correlation_id: Option<&str>,
    ) -> bool {
        self.calls.lock().push((
            routing_key.to_string(),
            payload.clone(),
            correlation_id.map(|s| s.to_string()),
        ));
        self.succeed
    }
}

/// Handler that counts invocations and returns a canned response
struct CountingHandler {
    calls: AtomicU32,
    response: Option<Value>,
    should_fail: bool,
}

impl CountingHandler {
    fn replying(response: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            response: Some(response),
            should_fail: false,
        })
    }

    fn silent() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            response: None,
            should_fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            response: None,
            should_fail: true,
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(&self, _envelope: &EventEnvelope) -> anyhow::Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            anyhow::bail!("simulated handler failure");
        }
        Ok(self.response.clone())
    }
}

fn pump_with(
    registry: Arc<HandlerRegistry>,
    publisher: Arc<RecordingPublisher>,
) -> (MessagePump, Arc<StatsCollector>) {
    let stats = Arc::new(StatsCollector::new());
    let pump = MessagePump::new(registry, publisher, stats.clone());
    (pump, stats)
}

fn reply_ctx(reply_to: &str, correlation_id: &str) -> DeliveryContext {
    DeliveryContext {
        reply_to: Some(reply_to.to_string()),
        correlation_id: Some(correlation_id.to_string()),
    }
}

#[tokio::test]
async fn routes_message_to_registered_handler_and_replies() {
    let registry = Arc::new(HandlerRegistry::new());
    let handler = CountingHandler::replying(json!({"text": "hi"}));
    registry.register("transcription", handler.clone());
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, stats) = pump_with(registry, publisher.clone());

    let body = br#"{"event_type":"transcription","payload":{"text":"hello"}}"#;
    let outcome = pump
        .dispatch(body, reply_ctx("reply.queue", "corr-42"))
        .await;

    assert_eq!(outcome, DispatchOutcome::Processed);
    assert_eq!(handler.call_count(), 1);
    assert_eq!(stats.received(), 1);
    assert_eq!(stats.processed(), 1);
    assert_eq!(stats.failed(), 0);

    // reply goes to the reply target with the correlation id unchanged
    let calls = publisher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "reply.queue");
    assert_eq!(calls[0].1, json!({"text": "hi"}));
    assert_eq!(calls[0].2.as_deref(), Some("corr-42"));
}

#[tokio::test]
async fn no_reply_target_skips_publish() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("transcription", CountingHandler::replying(json!({"text": "hi"})));
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, stats) = pump_with(registry, publisher.clone());

    let body = br#"{"event_type":"transcription"}"#;
    let outcome = pump.dispatch(body, DeliveryContext::default()).await;

    assert_eq!(outcome, DispatchOutcome::Processed);
    assert!(publisher.calls().is_empty());
    assert_eq!(stats.processed(), 1);
}

#[tokio::test]
async fn silent_handler_skips_publish() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("command", CountingHandler::silent());
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, stats) = pump_with(registry, publisher.clone());

    let body = br#"{"event_type":"command"}"#;
    let outcome = pump.dispatch(body, reply_ctx("reply.queue", "corr-1")).await;

    assert_eq!(outcome, DispatchOutcome::Processed);
    assert!(publisher.calls().is_empty());
    assert_eq!(stats.processed(), 1);
}

#[tokio::test]
async fn invalid_json_is_counted_and_dropped_without_handler_invocation() {
    let registry = Arc::new(HandlerRegistry::new());
    let handler = CountingHandler::silent();
    registry.register("transcription", handler.clone());
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, stats) = pump_with(registry, publisher.clone());

    let outcome = pump
        .dispatch(b"this is not json", DeliveryContext::default())
        .await;

    assert_eq!(outcome, DispatchOutcome::DecodeFailed);
    assert_eq!(handler.call_count(), 0);
    assert_eq!(stats.received(), 1);
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.processed(), 0);
}

#[tokio::test]
async fn unroutable_event_type_is_counted_and_dropped() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("transcription", CountingHandler::silent());
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, stats) = pump_with(registry, publisher.clone());

    let body = br#"{"event_type":"telemetry"}"#;
    let outcome = pump.dispatch(body, DeliveryContext::default()).await;

    assert_eq!(outcome, DispatchOutcome::Unroutable("telemetry".to_string()));
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.processed(), 0);
}

#[tokio::test]
async fn missing_event_type_falls_back_to_unknown() {
    let registry = Arc::new(HandlerRegistry::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, stats) = pump_with(registry, publisher);

    let body = br#"{"payload":{"text":"hello"}}"#;
    let outcome = pump.dispatch(body, DeliveryContext::default()).await;

    assert_eq!(outcome, DispatchOutcome::Unroutable("unknown".to_string()));
    assert_eq!(stats.failed(), 1);
}

#[tokio::test]
async fn handler_failure_is_counted_and_not_republished() {
    let registry = Arc::new(HandlerRegistry::new());
    let handler = CountingHandler::failing();
    registry.register("transcription", handler.clone());
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, stats) = pump_with(registry, publisher.clone());

    let body = br#"{"event_type":"transcription"}"#;
    let outcome = pump.dispatch(body, reply_ctx("reply.queue", "corr-1")).await;

    assert!(matches!(outcome, DispatchOutcome::HandlerFailed(_)));
    assert_eq!(handler.call_count(), 1);
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.processed(), 0);
    assert!(publisher.calls().is_empty());
}

#[tokio::test]
async fn reregistered_handler_takes_over_subsequent_messages() {
    let registry = Arc::new(HandlerRegistry::new());
    let first = CountingHandler::silent();
    let second = CountingHandler::silent();
    registry.register("transcription", first.clone());
    registry.register("transcription", second.clone());
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, _stats) = pump_with(registry, publisher);

    let body = br#"{"event_type":"transcription"}"#;
    pump.dispatch(body, DeliveryContext::default()).await;

    assert_eq!(first.call_count(), 0);
    assert_eq!(second.call_count(), 1);
}

#[tokio::test]
async fn publish_failure_still_counts_message_as_processed() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("transcription", CountingHandler::replying(json!({"text": "hi"})));
    let publisher = Arc::new(RecordingPublisher::failing());
    let (pump, stats) = pump_with(registry, publisher.clone());

    let body = br#"{"event_type":"transcription"}"#;
    let outcome = pump.dispatch(body, reply_ctx("reply.queue", "corr-1")).await;

    assert_eq!(outcome, DispatchOutcome::Processed);
    assert_eq!(publisher.calls().len(), 1);
    assert_eq!(stats.processed(), 1);
    assert_eq!(stats.failed(), 0);
}

#[tokio::test]
async fn every_delivery_yields_exactly_one_outcome() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("ok", CountingHandler::silent());
    registry.register("bad", CountingHandler::failing());
    let publisher = Arc::new(RecordingPublisher::new());
    let (pump, stats) = pump_with(registry, publisher);

    let bodies: &[&[u8]] = &[
        br#"{"event_type":"ok"}"#,
        b"garbage",
        br#"{"event_type":"nobody-home"}"#,
        br#"{"event_type":"bad"}"#,
        br#"{"event_type":"ok"}"#,
    ];
    for body in bodies {
        pump.dispatch(body, DeliveryContext::default()).await;
    }

    // one terminal decision per delivery: processed + failed == received
    assert_eq!(stats.received(), 5);
    assert_eq!(stats.processed(), 2);
    assert_eq!(stats.failed(), 3);
}
