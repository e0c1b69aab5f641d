//! LLM transports behind the `ChatModel` port.

pub mod anthropic;
pub mod stub;

pub use anthropic::AnthropicChatModel;
pub use stub::StubChatModel;

use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::ports::ChatModel;

/// Resolve a provider name from configuration into a transport.
pub fn build_chat_model(provider: &str) -> CoreResult<Arc<dyn ChatModel>> {
    match provider {
        "stub" => Ok(Arc::new(StubChatModel::new())),
        "anthropic" => Ok(Arc::new(AnthropicChatModel::from_env()?)),
        other => Err(CoreError::InvalidInput(format!(
            "unknown llm provider: {other}"
        ))),
    }
}
