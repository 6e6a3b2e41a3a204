//! Hooks around the conversation loop.
//!
//! Observers see the transcript before each model call and the outcome
//! after it. `HistoryObserver` uses this to accumulate the full
//! conversation as it grows, which is what gets persisted as session
//! memory.
use std::sync::Mutex;

use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::providers::base::ProviderResponse;

pub trait Observer: Send + Sync {
    fn before_model_call(&self, _step: usize, _messages: &[Message]) {}
    fn after_model_call(&self, _step: usize, _result: &Result<ProviderResponse, ProviderError>) {}
}

/// Accumulates every message that crosses the model boundary.
///
/// The transcript is append-only, so each `before_model_call` only has to
/// pick up the suffix it has not seen yet; `after_model_call` adds the
/// assistant reply so the final turn is never missing from the history.
#[derive(Default)]
pub struct HistoryObserver {
    history: Mutex<Vec<Message>>,
}

impl HistoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Message> {
        self.history.lock().unwrap().clone()
    }
}

impl Observer for HistoryObserver {
    fn before_model_call(&self, step: usize, messages: &[Message]) {
        let mut history = self.history.lock().unwrap();
        let seen = history.len();
        if messages.len() > seen {
            history.extend_from_slice(&messages[seen..]);
        }
        tracing::debug!(step, total = history.len(), "transcript snapshot");
    }

    fn after_model_call(&self, _step: usize, result: &Result<ProviderResponse, ProviderError>) {
        if let Ok(response) = result {
            self.history.lock().unwrap().push(response.message.clone());
        }
    }
}
