//! Agent bridge - forwards transcription text to the agent backend
//!
//! `HttpAgent` is the production `Agent` collaborator: a JSON POST with a
//! request timeout. `AgentReplyHandler` adapts the agent to the handler
//! interface, shaping the agent's answer into an `agent_response` envelope
//! that the pump publishes back to the requester.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use vb_common::EventEnvelope;

use crate::{Agent, MessageHandler};

#[derive(Debug, Clone)]
pub struct HttpAgentConfig {
    /// Endpoint prompts are POSTed to
    pub base_url: String,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpAgentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8283/v1/chat".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct AgentRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct AgentResponse {
    #[serde(default)]
    response: Option<String>,
}

/// HTTP client for the agent backend
pub struct HttpAgent {
    client: Client,
    config: HttpAgentConfig,
}

impl HttpAgent {
    pub fn new(config: HttpAgentConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { client, config }
    }
}

#[async_trait]
impl Agent for HttpAgent {
    async fn call(&self, text: &str, session_id: Option<&str>) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .post(&self.config.base_url)
            .json(&AgentRequest { text, session_id })
            .send()
            .await
            .context("agent request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("agent returned status {}", status);
        }

        let body: AgentResponse = response
            .json()
            .await
            .context("invalid agent response body")?;

        Ok(body.response.filter(|r| !r.is_empty()))
    }
}

/// Handler for transcription events: prompt the agent, reply with its answer
pub struct AgentReplyHandler {
    agent: Arc<dyn Agent>,
}

impl AgentReplyHandler {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl MessageHandler for AgentReplyHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<Option<serde_json::Value>> {
        let text = envelope
            .payload
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if text.is_empty() {
            debug!(event_id = ?envelope.event_id, "Transcription carries no text, nothing to do");
            return Ok(None);
        }

        let answer = self
            .agent
            .call(text, envelope.session_id.as_deref())
            .await?;

        Ok(answer.map(|text| {
            json!({
                "event_type": "agent_response",
                "request_id": envelope.request_id,
                "session_id": envelope.session_id,
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "payload": { "text": text },
            })
        }))
    }
}
