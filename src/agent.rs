//! The plan-and-act conversation loop.
//!
//! One `run` drives a bounded multi-step exchange: the model plans, asks
//! for tools, sees their results, and eventually produces a final answer.
//! Tool faults travel back into the conversation; only model-side failures
//! end the run with an error.
use serde_json::Value;
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::observer::Observer;
use crate::providers::base::{Provider, StopReason};
use crate::registry::ToolRegistry;

const CONTINUATION_PROMPT: &str = "Based on these results, please continue your research. \
You may use the tools again if needed. If no further steps are needed, provide a \
comprehensive response that synthesizes the information you have gathered.";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub name: String,
    /// Hard ceiling on model calls per run
    pub max_steps: usize,
    /// Prompt caching is requested for the first `cache_steps` steps only
    pub cache_steps: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: "ops_agent".to_string(),
            max_steps: 6,
            cache_steps: 4,
        }
    }
}

/// One tool invocation the model requested during a run.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Done,
    MaxStepsExceeded,
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub final_text: String,
    pub steps_taken: usize,
    pub tool_calls: Vec<ToolCallRecord>,
    pub transcript: Vec<Message>,
}

pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Arc<dyn ToolRegistry>,
    system_prompt: String,
    settings: AgentSettings,
    observers: Vec<Arc<dyn Observer>>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<dyn ToolRegistry>,
        system_prompt: String,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            registry,
            system_prompt,
            settings,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Run the loop on one task, optionally continuing a prior conversation.
    pub async fn run(
        &self,
        task: &str,
        prior: Vec<Message>,
    ) -> Result<Outcome, ProviderError> {
        let seed = if prior.is_empty() {
            initial_prompt(task)
        } else {
            followup_prompt(task)
        };
        let mut messages = prior;
        messages.push(Message::user().with_text(seed));

        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();

        for step in 0..self.settings.max_steps {
            let cache = step < self.settings.cache_steps;
            tracing::debug!(
                agent = %self.settings.name,
                step = step + 1,
                max = self.settings.max_steps,
                cache,
                "model call"
            );

            for observer in &self.observers {
                observer.before_model_call(step, &messages);
            }
            let result = self
                .provider
                .complete(&self.system_prompt, &messages, self.registry.tools(), cache)
                .await;
            for observer in &self.observers {
                observer.after_model_call(step, &result);
            }
            let response = result?;

            let requests: Vec<_> = response
                .message
                .tool_requests()
                .into_iter()
                .cloned()
                .collect();
            messages.push(response.message.clone());

            match response.stop_reason {
                StopReason::ToolUse if !requests.is_empty() => {
                    let mut results = Message::user();
                    for request in requests {
                        tracing::info!(
                            tool = %request.call.name,
                            id = %request.id,
                            "executing tool"
                        );
                        tool_calls.push(ToolCallRecord {
                            id: request.id.clone(),
                            name: request.call.name.clone(),
                            input: request.call.arguments.clone(),
                        });
                        let output = self
                            .registry
                            .call(&request.call.name, request.call.arguments.clone())
                            .await;
                        if output.is_error() {
                            tracing::warn!(tool = %request.call.name, "tool returned an error result");
                        }
                        results = results.with_tool_response(request.id, output);
                    }
                    results = results.with_text(CONTINUATION_PROMPT);
                    messages.push(results);
                }
                StopReason::EndTurn => {
                    return Ok(Outcome {
                        status: OutcomeStatus::Done,
                        final_text: response.message.text(),
                        steps_taken: step + 1,
                        tool_calls,
                        transcript: messages,
                    });
                }
                StopReason::ToolUse => {
                    // tool_use stop without any request blocks; nothing to run
                    tracing::warn!("tool_use stop reason with no tool requests");
                    return Ok(Outcome {
                        status: OutcomeStatus::Done,
                        final_text: response.message.text(),
                        steps_taken: step + 1,
                        tool_calls,
                        transcript: messages,
                    });
                }
                StopReason::Other(ref reason) => {
                    tracing::warn!(reason = %reason, "unexpected stop reason, treating as final");
                    return Ok(Outcome {
                        status: OutcomeStatus::Done,
                        final_text: response.message.text(),
                        steps_taken: step + 1,
                        tool_calls,
                        transcript: messages,
                    });
                }
            }
        }

        tracing::warn!(
            agent = %self.settings.name,
            max_steps = self.settings.max_steps,
            "step budget exhausted"
        );
        let final_text = format!(
            "I reached the step limit ({}) before completing the task. Here is what was \
             gathered so far: {} tool call(s) were made. Consider narrowing the request \
             or continuing in a follow-up session.",
            self.settings.max_steps,
            tool_calls.len()
        );
        Ok(Outcome {
            status: OutcomeStatus::MaxStepsExceeded,
            final_text,
            steps_taken: self.settings.max_steps,
            tool_calls,
            transcript: messages,
        })
    }
}

fn initial_prompt(task: &str) -> String {
    format!(
        "Please help me handle the following ask:\n\n{}\n\n\
         Think carefully about what information you need to gather and which tools \
         would be most helpful. Develop an optimized plan: use multiple tools in the \
         same step whenever possible, and schedule dependent lookups as early as \
         possible. Then execute the plan step by step using the available tools.\n\n\
         Provide a comprehensive response that synthesizes the information you gather. \
         Include the specific sources used, formatted as \
         [Source #: Source Title - Source Link].",
        task
    )
}

fn followup_prompt(task: &str) -> String {
    format!(
        "Please help me handle the following ask:\n\n{}\n\n\
         Look carefully at the earlier conversation and extract anything helpful for \
         the current ask, then gather whatever additional information you need using \
         the available tools.\n\n\
         Provide a comprehensive response that synthesizes the information you gather.",
        task
    )
}
