//! Agent bridge tests
//!
//! Tests for:
//! - HttpAgent request/response handling against a mock server
//! - AgentReplyHandler envelope shaping and error propagation

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vb_common::EventEnvelope;
use vb_consumer::agent::{AgentReplyHandler, HttpAgent, HttpAgentConfig};
use vb_consumer::{Agent, MessageHandler};

fn agent_for(server: &MockServer) -> HttpAgent {
    HttpAgent::new(HttpAgentConfig {
        base_url: format!("{}/v1/chat", server.uri()),
        request_timeout: Duration::from_secs(2),
    })
}

#[tokio::test]
async fn http_agent_posts_prompt_and_returns_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(body_json(json!({"text": "hello", "session_id": "sess-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "hi there"})))
        .expect(1)
        .mount(&server)
        .await;

    let agent = agent_for(&server);
    let answer = agent.call("hello", Some("sess-1")).await.unwrap();

    assert_eq!(answer.as_deref(), Some("hi there"));
}

#[tokio::test]
async fn http_agent_omits_absent_session_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat"))
        .and(body_json(json!({"text": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "hi"})))
        .expect(1)
        .mount(&server)
        .await;

    let agent = agent_for(&server);
    let answer = agent.call("hello", None).await.unwrap();

    assert_eq!(answer.as_deref(), Some("hi"));
}

#[tokio::test]
async fn http_agent_treats_empty_response_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": ""})))
        .mount(&server)
        .await;

    let agent = agent_for(&server);
    assert!(agent.call("hello", None).await.unwrap().is_none());
}

#[tokio::test]
async fn http_agent_surfaces_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let agent = agent_for(&server);
    let err = agent.call("hello", None).await.unwrap_err();
    assert!(err.to_string().contains("500"));
}

/// In-process agent stub for handler-shaping tests
struct StubAgent {
    answer: Option<String>,
    fail: bool,
}

#[async_trait]
impl Agent for StubAgent {
    async fn call(&self, _text: &str, _session_id: Option<&str>) -> anyhow::Result<Option<String>> {
        if self.fail {
            anyhow::bail!("agent unreachable");
        }
        Ok(self.answer.clone())
    }
}

fn transcription_envelope(text: &str) -> EventEnvelope {
    let mut envelope = EventEnvelope::new("transcription", json!({ "text": text }));
    envelope.request_id = Some("req-7".to_string());
    envelope.session_id = Some("sess-7".to_string());
    envelope
}

#[tokio::test]
async fn reply_handler_shapes_agent_response_envelope() {
    let handler = AgentReplyHandler::new(Arc::new(StubAgent {
        answer: Some("sure thing".to_string()),
        fail: false,
    }));

    let reply = handler
        .handle(&transcription_envelope("do the thing"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reply["event_type"], "agent_response");
    assert_eq!(reply["request_id"], "req-7");
    assert_eq!(reply["session_id"], "sess-7");
    assert_eq!(reply["payload"]["text"], "sure thing");
    assert!(reply["timestamp"].is_string());
}

#[tokio::test]
async fn reply_handler_ignores_empty_transcriptions() {
    let handler = AgentReplyHandler::new(Arc::new(StubAgent {
        answer: Some("never used".to_string()),
        fail: false,
    }));

    let reply = handler
        .handle(&EventEnvelope::new("transcription", json!({})))
        .await
        .unwrap();

    assert!(reply.is_none());
}

#[tokio::test]
async fn reply_handler_propagates_agent_failure() {
    let handler = AgentReplyHandler::new(Arc::new(StubAgent {
        answer: None,
        fail: true,
    }));

    let err = handler
        .handle(&transcription_envelope("hello"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("agent unreachable"));
}
