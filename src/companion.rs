use crate::error::{ChatError, describe_transport};
use crate::service::{CHAT_PATH, ServiceConfig};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const CANNED_REPLY: &str = "I hear you. Taking a moment to breathe deeply can help reset your nervous system. Shall we try a 1-minute exercise?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_stress_level: Option<u8>,
}

/// Produces the companion's answer to one user message.
///
/// The HTTP client and the scripted stand-in share this interface so the
/// conversation logic cannot tell them apart.
#[async_trait]
pub trait Companion: Send + Sync {
    async fn reply(&self, request: ReplyRequest) -> Result<String, ChatError>;
}

#[derive(Debug, Clone)]
pub struct HttpCompanion {
    client: Client,
    endpoint: String,
}

impl HttpCompanion {
    pub fn new(service: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            client: service.build_client()?,
            endpoint: service.endpoint(CHAT_PATH),
        })
    }
}

#[async_trait]
impl Companion for HttpCompanion {
    async fn reply(&self, request: ReplyRequest) -> Result<String, ChatError> {
        if request.message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "companion request failed");
                ChatError::Transport(describe_transport(&err))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "companion service rejected message");
            return Err(ChatError::Service {
                status_code: status.as_u16(),
            });
        }

        let json: Value = response.json().await.map_err(|err| {
            if err.is_decode() {
                ChatError::Protocol(format!("invalid JSON: {err}"))
            } else {
                ChatError::Transport(describe_transport(&err))
            }
        })?;

        let reply = extract_reply(&json).ok_or_else(|| {
            error!(body = %json, "companion response has no reply text");
            ChatError::Protocol("missing reply".to_string())
        })?;
        debug!(chars = reply.len(), "companion replied");
        Ok(reply)
    }
}

fn extract_reply(root: &Value) -> Option<String> {
    ["reply", "response", "message"]
        .iter()
        .find_map(|key| root.get(*key).and_then(Value::as_str))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStyle {
    /// The breathing-exercise prompt for every message.
    Canned,
    /// `You said: "<message>"`.
    Echo,
}

/// Local stand-in for the companion service that answers after a fixed delay.
#[derive(Debug, Clone)]
pub struct ScriptedCompanion {
    delay: Duration,
    style: ScriptStyle,
}

impl ScriptedCompanion {
    pub fn new(delay: Duration, style: ScriptStyle) -> Self {
        Self { delay, style }
    }
}

impl Default for ScriptedCompanion {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), ScriptStyle::Canned)
    }
}

#[async_trait]
impl Companion for ScriptedCompanion {
    async fn reply(&self, request: ReplyRequest) -> Result<String, ChatError> {
        if request.message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        tokio::time::sleep(self.delay).await;
        Ok(match self.style {
            ScriptStyle::Canned => CANNED_REPLY.to_string(),
            ScriptStyle::Echo => format!("You said: \"{}\"", request.message),
        })
    }
}
