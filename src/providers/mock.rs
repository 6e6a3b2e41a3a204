use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::base::{Provider, ProviderResponse, StopReason, Usage};
use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::Tool;

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    script: Arc<Mutex<Vec<Result<ProviderResponse, ProviderError>>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of results
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

/// Build a text response with the given stop reason
pub fn response(message: Message, stop_reason: StopReason) -> ProviderResponse {
    ProviderResponse {
        message,
        stop_reason,
        usage: Usage::default(),
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[Tool],
        _cache: bool,
    ) -> Result<ProviderResponse, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            // Return an empty final turn if the script runs out
            Ok(response(
                Message::assistant().with_text(""),
                StopReason::EndTurn,
            ))
        } else {
            script.remove(0)
        }
    }
}
