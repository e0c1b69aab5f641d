//! Anthropic messages-API transport for the comparative judge.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::ports::{ChatModel, ChatRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct AnthropicChatModel {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicChatModel {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::External(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Read the API key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> CoreResult<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| CoreError::State("ANTHROPIC_API_KEY is not set".into()))?;
        Self::new(api_key, None)
    }
}

#[async_trait]
impl ChatModel for AnthropicChatModel {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, request: ChatRequest) -> CoreResult<String> {
        let body = json!({
            "model": request.model,
            "max_tokens": 1024,
            "temperature": request.temperature,
            "system": request.system,
            "messages": [{ "role": "user", "content": request.user }],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::External(format!("llm transport: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::External(format!(
                "llm transport: status {status}: {detail}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CoreError::External(format!("llm response: {e}")))?;

        payload["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CoreError::External("llm response: missing content text".into()))
    }
}
