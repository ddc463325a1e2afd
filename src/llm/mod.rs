//! Reqwest-based client for the Anthropic Messages API with tool use.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::Config;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub system: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
}

impl MessageResponse {
    pub fn wants_tool(&self) -> bool {
        self.stop_reason == Some(StopReason::ToolUse)
    }

    /// First tool-use block; later ones in the same response are ignored.
    pub fn first_tool_use(&self) -> Option<(&str, &serde_json::Value)> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::ToolUse { name, input, .. } => Some((name.as_str(), input)),
            _ => None,
        })
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Seam between the dispatcher and the hosted model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse>;
}

#[derive(Debug)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let timeout = cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(300);
        let base_url = cfg
            .get("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|| "https://api.anthropic.com".into());
        let mut base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.ends_with("/v1") {
            base_url = format!("{}/v1", base_url);
        }
        let api_key = cfg.get("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self { http, base_url, api_key })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        if let Some(key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(key)?);
        }
        Ok(headers)
    }
}

#[async_trait]
impl ModelClient for LlmClient {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse> {
        let url = format!("{}/messages", self.base_url);
        tracing::debug!(model = %request.model, "sending messages request");

        let resp = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await
            .context("failed to send messages request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM error: {} {}", status, body);
        }

        resp.json::<MessageResponse>()
            .await
            .context("failed to decode messages response")
    }
}
