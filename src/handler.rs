//! Trigger entry point: one request in, one answer out.
//!
//! The handler resolves the task text, restores session memory, runs the
//! conversation loop, and persists what happened. Infrastructure trouble
//! downstream of the task text degrades to an apologetic answer instead of
//! an error; persistence failures are logged and dropped.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::{Agent, AgentSettings};
use crate::errors::ProviderError;
use crate::knowledge::{render_report, KnowledgeStore};
use crate::memory::{MemoryStore, ObjectStore};
use crate::observer::HistoryObserver;
use crate::providers::base::Provider;
use crate::registry::remote::{CatalogClient, RemoteRegistry};
use crate::registry::ToolRegistry;

/// Session memory stays warm for this long after each answer.
const SESSION_TTL_SECS: i64 = 20 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRequest {
    /// Task text, unless the payload is staged in the object store
    #[serde(default)]
    pub text: Option<String>,
    /// Key of a staged payload holding the task text
    #[serde(default)]
    pub payload_key: Option<String>,
    /// Existing session to continue; a fresh session id is minted otherwise
    #[serde(default)]
    pub session_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub output_text: String,
    pub session_id: String,
    /// Unix seconds, carried as a string
    pub expires_at: String,
}

/// Where the runtime gets its tools from.
pub enum ToolSource {
    Fixed(Arc<dyn ToolRegistry>),
    Remote(CatalogClient),
}

/// Everything one trigger invocation needs, wired once at startup.
pub struct Runtime<S: ObjectStore> {
    pub provider: Arc<dyn Provider>,
    pub tool_source: ToolSource,
    pub memory: MemoryStore<Arc<S>>,
    pub knowledge: KnowledgeStore<Arc<S>>,
    pub payloads: Arc<S>,
    pub agent_settings: AgentSettings,
    pub system_prompt: String,
}

impl<S: ObjectStore> Runtime<S> {
    pub async fn handle(&self, request: TriggerRequest) -> anyhow::Result<TriggerResponse> {
        let session_id = request
            .session_hint
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        tracing::info!(session = %session_id, "trigger received");

        let task = match self.resolve_task(&request).await? {
            Some(task) => task,
            None => anyhow::bail!("trigger carries neither text nor a payload key"),
        };

        let registry: Arc<dyn ToolRegistry> = match &self.tool_source {
            ToolSource::Fixed(registry) => registry.clone(),
            ToolSource::Remote(client) => {
                match RemoteRegistry::discover(client.clone()).await {
                    Ok(registry) => Arc::new(registry),
                    Err(err) => {
                        // No tools means no useful triage; answer without
                        // spending any model calls.
                        tracing::error!(error = %err, "tool catalog unavailable");
                        return Ok(self.respond(
                            "I am currently unable to reach the tool catalog, so I cannot \
                             look into this event right now. Please try again shortly."
                                .to_string(),
                            session_id,
                        ));
                    }
                }
            }
        };

        let agent_name = self.agent_settings.name.clone();
        let prior = self.memory.load(&agent_name, &session_id).await;
        let observer = Arc::new(HistoryObserver::new());
        let agent = Agent::new(
            self.provider.clone(),
            registry,
            self.system_prompt.clone(),
            self.agent_settings.clone(),
        )
        .with_observer(observer.clone());

        let outcome = match agent.run(&task, prior).await {
            Ok(outcome) => outcome,
            Err(err @ (ProviderError::Exhausted { .. } | ProviderError::Fatal(_))) => {
                tracing::error!(error = %err, "model chain failed, degrading");
                return Ok(self.respond(
                    "I could not complete the analysis because the language models are \
                     currently unavailable. The event has not been triaged; please retry."
                        .to_string(),
                    session_id,
                ));
            }
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = self
            .memory
            .save(&agent_name, &session_id, &observer.history())
            .await
        {
            tracing::warn!(error = %err, "saving session memory failed");
        }
        let report = render_report(&agent_name, &task, &outcome);
        if let Err(err) = self
            .knowledge
            .save(&agent_name, &session_id, &report, None)
            .await
        {
            tracing::warn!(error = %err, "saving run report failed");
        }

        tracing::info!(
            session = %session_id,
            steps = outcome.steps_taken,
            tool_calls = outcome.tool_calls.len(),
            "trigger handled"
        );
        Ok(self.respond(outcome.final_text, session_id))
    }

    /// Direct text wins; otherwise the task is staged in the object store.
    async fn resolve_task(&self, request: &TriggerRequest) -> anyhow::Result<Option<String>> {
        if let Some(text) = request.text.as_ref().filter(|t| !t.is_empty()) {
            return Ok(Some(text.clone()));
        }
        if let Some(key) = request.payload_key.as_ref().filter(|k| !k.is_empty()) {
            let bytes = self
                .payloads
                .get(key)
                .await?
                .ok_or_else(|| anyhow::anyhow!("staged payload {} not found", key))?;
            tracing::info!(key = %key, "task loaded from staged payload");
            return Ok(Some(String::from_utf8(bytes)?));
        }
        Ok(None)
    }

    fn respond(&self, output_text: String, session_id: String) -> TriggerResponse {
        let expires_at = Utc::now().timestamp() + SESSION_TTL_SECS;
        TriggerResponse {
            output_text,
            session_id,
            expires_at: expires_at.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FileStore;
    use crate::models::message::Message;
    use crate::models::tool::ToolCall;
    use crate::providers::base::StopReason;
    use crate::providers::mock::{response, MockProvider};
    use crate::registry::ops::MemoryOps;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn runtime(
        dir: &TempDir,
        provider: Arc<MockProvider>,
        tool_source: ToolSource,
    ) -> Runtime<FileStore> {
        let store = Arc::new(FileStore::new(dir.path()));
        Runtime {
            provider,
            tool_source,
            memory: MemoryStore::new(store.clone()),
            knowledge: KnowledgeStore::new(store.clone()),
            payloads: store,
            agent_settings: AgentSettings::default(),
            system_prompt: "You are a triage agent.".to_string(),
        }
    }

    fn fixed_toolbox() -> (MemoryOps, ToolSource) {
        let ops = MemoryOps::new();
        let source = ToolSource::Fixed(Arc::new(ops.toolbox()));
        (ops, source)
    }

    #[tokio::test]
    async fn test_end_to_end_with_tool_use() {
        let dir = tempdir().unwrap();
        let (ops, source) = fixed_toolbox();
        let provider = Arc::new(MockProvider::new(vec![
            Ok(response(
                Message::assistant().with_tool_request(
                    "t1",
                    ToolCall::new(
                        "create_ticket",
                        json!({"event_pk": "ev-1", "ticket_title": "Investigate"}),
                    ),
                ),
                StopReason::ToolUse,
            )),
            Ok(response(
                Message::assistant().with_text("Ticket filed."),
                StopReason::EndTurn,
            )),
        ]));
        let runtime = runtime(&dir, provider, source);

        let answer = runtime
            .handle(TriggerRequest {
                text: Some("triage this event".to_string()),
                session_hint: Some("s-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(answer.output_text, "Ticket filed.");
        assert_eq!(answer.session_id, "s-1");
        assert!(answer.expires_at.parse::<i64>().unwrap() > Utc::now().timestamp());
        assert_eq!(ops.tickets().len(), 1);

        // memory and the run report were persisted
        assert!(dir.path().join("ops_agent-memory/s-1.json").exists());
        assert!(dir.path().join("ops_agent-knowledge/s-1.md").exists());
    }

    #[tokio::test]
    async fn test_session_memory_feeds_next_trigger() {
        let dir = tempdir().unwrap();
        let (_, source) = fixed_toolbox();
        let provider = Arc::new(MockProvider::new(vec![Ok(response(
            Message::assistant().with_text("first answer"),
            StopReason::EndTurn,
        ))]));
        let first = runtime(&dir, provider, source);
        first
            .handle(TriggerRequest {
                text: Some("first ask".to_string()),
                session_hint: Some("s-2".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let loaded = first.memory.load("ops_agent", "s-2").await;
        // seed user message plus the assistant answer
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].text().contains("first ask"));
        assert_eq!(loaded[1].text(), "first answer");
    }

    #[tokio::test]
    async fn test_payload_key_resolves_task() {
        let dir = tempdir().unwrap();
        let (_, source) = fixed_toolbox();
        let provider = Arc::new(MockProvider::new(vec![Ok(response(
            Message::assistant().with_text("handled"),
            StopReason::EndTurn,
        ))]));
        let runtime = runtime(&dir, provider, source);
        runtime
            .payloads
            .put(
                "staged/big-event.txt",
                b"very large event description".to_vec(),
                "text/plain",
            )
            .await
            .unwrap();

        let answer = runtime
            .handle(TriggerRequest {
                payload_key: Some("staged/big-event.txt".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(answer.output_text, "handled");
        // a session id was minted
        assert!(!answer.session_id.is_empty());
    }

    #[tokio::test]
    async fn test_empty_trigger_is_an_error() {
        let dir = tempdir().unwrap();
        let (_, source) = fixed_toolbox();
        let runtime = runtime(&dir, Arc::new(MockProvider::new(Vec::new())), source);
        let err = runtime.handle(TriggerRequest::default()).await.unwrap_err();
        assert!(err.to_string().contains("neither text nor a payload key"));
    }

    #[tokio::test]
    async fn test_unreachable_catalog_degrades_without_model_calls() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(Vec::new()));
        // endpoint that nothing listens on
        let client = CatalogClient::new("http://127.0.0.1:9").unwrap();
        let runtime = runtime(&dir, provider.clone(), ToolSource::Remote(client));

        let answer = runtime
            .handle(TriggerRequest {
                text: Some("triage".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(answer.output_text.contains("tool catalog"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_exhaustion_degrades_to_text() {
        let dir = tempdir().unwrap();
        let (_, source) = fixed_toolbox();
        let provider = Arc::new(MockProvider::new(vec![Err(ProviderError::Exhausted {
            attempts: 10,
            last: "throttled".to_string(),
        })]));
        let runtime = runtime(&dir, provider, source);

        let answer = runtime
            .handle(TriggerRequest {
                text: Some("triage".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(answer.output_text.contains("currently unavailable"));
    }

    #[test]
    fn test_request_parses_with_missing_fields() {
        let request: TriggerRequest = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(request.text.as_deref(), Some("hi"));
        assert!(request.payload_key.is_none());
        assert!(request.session_hint.is_none());
    }
}
