//! Port for the external LLM capability used by the comparative judge.

use async_trait::async_trait;

use crate::domain::errors::CoreResult;

/// A single chat completion request. The judge always pins temperature to
/// zero and constrains the output to JSON through the system instruction.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f64,
}

/// External chat-completion capability. Implementations live in
/// `adapters::llm`; transport failures surface as `ExternalError`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name for diagnostics and the outcome's `model` field.
    fn provider(&self) -> &'static str;

    /// Send one request and return the raw assistant text.
    async fn complete(&self, request: ChatRequest) -> CoreResult<String>;
}
