use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::configs::ModelConfig;
use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub cache_read_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        cache_read_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_read_tokens,
        }
    }
}

/// The signal from a model response indicating whether it finished with
/// plain text, requested tool execution, or produced something unexpected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            other => StopReason::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// One call against a concrete text-generation backend, for one model.
///
/// Implementations make exactly one remote call and map failures into the
/// transient/fatal taxonomy; retry and fallback live one layer up.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn converse(
        &self,
        model: &ModelConfig,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        cache: bool,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// What the conversation loop consumes: a completion source with model
/// selection, retry and fallback already applied behind the trait.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        cache: bool,
    ) -> Result<ProviderResponse, ProviderError>;
}
