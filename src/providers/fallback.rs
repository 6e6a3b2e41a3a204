use async_trait::async_trait;
use std::time::Duration;

use super::base::{Gateway, Provider, ProviderResponse};
use super::configs::ModelConfig;
use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::Tool;

/// Ordered fallback across candidate models with bounded per-model retry.
///
/// Retrying the same model is attempted first (fast recovery from
/// throttling) before paying the latency cost of switching models. The
/// starting model is fixed per controller, not re-chosen per step, so one
/// invocation sticks with its preferred model. Fatal errors abort
/// immediately without touching the rest of the chain.
pub struct FallbackProvider<G: Gateway> {
    gateway: G,
    models: Vec<ModelConfig>,
    start_index: usize,
    max_retries_per_model: usize,
    retry_delay: Duration,
}

impl<G: Gateway> FallbackProvider<G> {
    pub fn new(gateway: G, models: Vec<ModelConfig>) -> Self {
        assert!(!models.is_empty(), "fallback chain must not be empty");
        Self {
            gateway,
            models,
            start_index: 0,
            max_retries_per_model: 2,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Offset of the preferred model within the chain
    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index % self.models.len();
        self
    }

    pub fn with_max_retries_per_model(mut self, max_retries_per_model: usize) -> Self {
        self.max_retries_per_model = max_retries_per_model.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

#[async_trait]
impl<G: Gateway> Provider for FallbackProvider<G> {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        cache: bool,
    ) -> Result<ProviderResponse, ProviderError> {
        let chain_len = self.models.len();
        let mut attempts = 0;
        let mut last: Option<ProviderError> = None;

        for offset in 0..chain_len {
            let idx = (self.start_index + offset) % chain_len;
            let model = &self.models[idx];

            for attempt in 0..self.max_retries_per_model {
                attempts += 1;
                match self
                    .gateway
                    .converse(model, system, messages, tools, cache)
                    .await
                {
                    Ok(response) => {
                        if offset > 0 || attempt > 0 {
                            tracing::info!(
                                model = %model.model_id,
                                offset,
                                attempt,
                                "model call recovered"
                            );
                        }
                        return Ok(response);
                    }
                    Err(err @ ProviderError::Fatal(_)) => {
                        tracing::error!(model = %model.model_id, error = %err, "fatal model failure, aborting");
                        return Err(err);
                    }
                    Err(err) => {
                        tracing::warn!(
                            model = %model.model_id,
                            attempt = attempt + 1,
                            max = self.max_retries_per_model,
                            error = %err,
                            "model call failed"
                        );
                        last = Some(err);
                        if attempt + 1 < self.max_retries_per_model {
                            tokio::time::sleep(self.retry_delay).await;
                        } else if offset + 1 < chain_len {
                            tracing::info!("falling back to next model");
                        }
                    }
                }
            }
        }

        Err(ProviderError::Exhausted {
            attempts,
            last: last
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::base::{StopReason, Usage};
    use std::sync::Mutex;

    /// Scripted gateway that records which model served each call.
    struct ScriptedGateway {
        script: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Gateway for ScriptedGateway {
        async fn converse(
            &self,
            model: &ModelConfig,
            _system: &str,
            _messages: &[Message],
            _tools: &[Tool],
            _cache: bool,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.lock().unwrap().push(model.model_id.clone());
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(ok_response("default"))
            } else {
                script.remove(0)
            }
        }
    }

    fn ok_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant().with_text(text),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        }
    }

    fn transient() -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Transient("throttled".to_string()))
    }

    fn chain(ids: &[&str]) -> Vec<ModelConfig> {
        ids.iter().map(|id| ModelConfig::new(*id)).collect()
    }

    fn provider(
        gateway: ScriptedGateway,
        models: Vec<ModelConfig>,
    ) -> FallbackProvider<ScriptedGateway> {
        FallbackProvider::new(gateway, models)
            .with_max_retries_per_model(2)
            .with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let gateway = ScriptedGateway::new(vec![Ok(ok_response("hi"))]);
        let fallback = provider(gateway, chain(&["a", "b"]));

        let response = fallback
            .complete("system", &[Message::user().with_text("task")], &[], false)
            .await
            .unwrap();
        assert_eq!(response.message.text(), "hi");
        assert_eq!(fallback.gateway.calls(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_same_model_before_falling_back() {
        let gateway = ScriptedGateway::new(vec![transient(), Ok(ok_response("second try"))]);
        let fallback = provider(gateway, chain(&["a", "b"]));

        let response = fallback
            .complete("system", &[Message::user().with_text("task")], &[], false)
            .await
            .unwrap();
        assert_eq!(response.message.text(), "second try");
        assert_eq!(fallback.gateway.calls(), vec!["a", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fall_through_to_next_model() {
        let gateway =
            ScriptedGateway::new(vec![transient(), transient(), Ok(ok_response("from b"))]);
        let fallback = provider(gateway, chain(&["a", "b"]));

        let response = fallback
            .complete("system", &[Message::user().with_text("task")], &[], false)
            .await
            .unwrap();
        assert_eq!(response.message.text(), "from b");
        assert_eq!(fallback.gateway.calls(), vec!["a", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_makes_exactly_n_times_r_calls() {
        // 3 models x 2 retries, all transient
        let gateway = ScriptedGateway::new((0..6).map(|_| transient()).collect());
        let fallback = provider(gateway, chain(&["a", "b", "c"]));

        let err = fallback
            .complete("system", &[Message::user().with_text("task")], &[], false)
            .await
            .unwrap_err();

        assert_eq!(
            fallback.gateway.calls(),
            vec!["a", "a", "b", "b", "c", "c"]
        );
        match err {
            ProviderError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 6);
                assert!(last.contains("throttled"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_aborts_immediately() {
        let gateway = ScriptedGateway::new(vec![
            transient(),
            Err(ProviderError::Fatal("bad request".to_string())),
        ]);
        let fallback = provider(gateway, chain(&["a", "b", "c"]));

        let err = fallback
            .complete("system", &[Message::user().with_text("task")], &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Fatal(_)));
        // one transient on "a", then the fatal on the retry; nothing after
        assert_eq!(fallback.gateway.calls(), vec!["a", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_index_wraps_around() {
        let gateway = ScriptedGateway::new(vec![transient(), transient(), Ok(ok_response("ok"))]);
        let fallback = provider(gateway, chain(&["a", "b", "c"])).with_start_index(2);

        fallback
            .complete("system", &[Message::user().with_text("task")], &[], false)
            .await
            .unwrap();
        // preferred model is "c"; fallback wraps to the head of the chain
        assert_eq!(fallback.gateway.calls(), vec!["c", "c", "a"]);
    }
}
