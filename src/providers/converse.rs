use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Gateway, ProviderResponse, StopReason, Usage};
use super::configs::ModelConfig;
use crate::errors::ProviderError;
use crate::models::message::{Message, MessageContent, Role, ToolResultStatus};
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Clone)]
pub struct ConverseProviderConfig {
    pub host: String,
    pub api_key: String,
}

/// Gateway to a messages-style chat completion endpoint.
///
/// Makes exactly one HTTP call per `converse`; the fallback controller owns
/// retries and model switching.
pub struct ConverseProvider {
    client: Client,
    config: ConverseProviderConfig,
}

impl ConverseProvider {
    pub fn new(config: ConverseProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = data.get("usage");
        let read = |key: &str| {
            usage
                .and_then(|u| u.get(key))
                .and_then(|v| v.as_i64())
                .map(|v| v as i32)
        };
        Usage::new(
            read("input_tokens"),
            read("output_tokens"),
            read("cache_read_input_tokens"),
        )
    }

    fn messages_to_spec(messages: &[Message]) -> Vec<Value> {
        let mut spec = Vec::new();
        for message in messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            let mut blocks = Vec::new();
            for content in &message.content {
                match content {
                    MessageContent::Text(text) => {
                        if !text.text.is_empty() {
                            blocks.push(json!({"type": "text", "text": text.text}));
                        }
                    }
                    MessageContent::ToolRequest(request) => {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": request.call.name,
                            "input": request.call.arguments,
                        }));
                    }
                    MessageContent::ToolResponse(response) => {
                        blocks.push(json!({
                            "type": "tool_result",
                            "tool_use_id": response.id,
                            "content": [{"type": "text", "text": response.output.text}],
                            "is_error": response.output.status == ToolResultStatus::Error,
                        }));
                    }
                }
            }

            spec.push(json!({"role": role, "content": blocks}));
        }
        spec
    }

    fn tools_to_spec(tools: &[Tool], cache: bool) -> Vec<Value> {
        let mut spec: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect();

        // A cache marker on the last tool covers the whole catalog prefix.
        if cache {
            if let Some(last) = spec.last_mut().and_then(|v| v.as_object_mut()) {
                last.insert(
                    "cache_control".to_string(),
                    json!({"type": "ephemeral"}),
                );
            }
        }
        spec
    }

    fn response_to_message(body: &Value) -> Result<Message, ProviderError> {
        let blocks = body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                ProviderError::Fatal(format!("missing content in model response: {}", body))
            })?;

        let mut message = Message::assistant();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    let text = block
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default();
                    message = message.with_text(text);
                }
                Some("tool_use") => {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            ProviderError::Fatal("tool_use block without id".to_string())
                        })?;
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            ProviderError::Fatal("tool_use block without name".to_string())
                        })?;
                    let input = block.get("input").cloned().unwrap_or(json!({}));
                    message = message.with_tool_request(id, ToolCall::new(name, input));
                }
                // Unknown block kinds (e.g. thinking) are dropped rather
                // than failing the whole response.
                _ => {}
            }
        }
        Ok(message)
    }

    async fn post(
        &self,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        match status {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| ProviderError::Fatal(format!("malformed response body: {}", e))),
            s if s == StatusCode::TOO_MANY_REQUESTS || s.as_u16() >= 500 => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::Transient(format!(
                    "server error {}: {}",
                    status, body
                )))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::Fatal(format!(
                    "request rejected {}: {}",
                    status, body
                )))
            }
        }
    }
}

#[async_trait]
impl Gateway for ConverseProvider {
    async fn converse(
        &self,
        model: &ModelConfig,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        cache: bool,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut system_block = json!({"type": "text", "text": system});
        if cache && model.cache_prompt {
            system_block["cache_control"] = json!({"type": "ephemeral"});
        }

        let mut payload = json!({
            "model": model.model_id,
            "system": [system_block],
            "messages": Self::messages_to_spec(messages),
            "temperature": model.temperature,
            "max_tokens": 4096,
        });
        if !tools.is_empty() {
            payload["tools"] = json!(Self::tools_to_spec(tools, cache && model.cache_tools));
        }

        let body = self
            .post(payload, Duration::from_secs(model.timeout_secs))
            .await?;

        let message = Self::response_to_message(&body)?;
        let stop_reason = body
            .get("stop_reason")
            .and_then(|s| s.as_str())
            .map(StopReason::parse)
            .unwrap_or_else(|| StopReason::Other("missing".to_string()));
        let usage = Self::get_usage(&body);

        tracing::debug!(
            model = %model.model_id,
            ?stop_reason,
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "model call completed"
        );

        Ok(ProviderResponse {
            message,
            stop_reason,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model() -> ModelConfig {
        ModelConfig::new("test-model").with_cache_prompt()
    }

    async fn setup_mock_server(template: ResponseTemplate) -> (MockServer, ConverseProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(template)
            .mount(&mock_server)
            .await;

        let provider = ConverseProvider::new(ConverseProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
        })
        .unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_converse_end_turn() {
        let body = json!({
            "content": [{"type": "text", "text": "All clear, no action needed."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 15, "cache_read_input_tokens": 4}
        });
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(body)).await;

        let messages = vec![Message::user().with_text("Any ongoing incidents?")];
        let response = provider
            .converse(&model(), "You are a triage assistant.", &messages, &[], true)
            .await
            .unwrap();

        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.message.text(), "All clear, no action needed.");
        assert_eq!(response.usage.input_tokens, Some(12));
        assert_eq!(response.usage.cache_read_tokens, Some(4));
    }

    #[tokio::test]
    async fn test_converse_tool_use() {
        let body = json!({
            "content": [
                {"type": "text", "text": "Let me look that up."},
                {"type": "tool_use", "id": "tu_1", "name": "search_ops_events",
                 "input": {"query": "rds outage"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 9}
        });
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(body)).await;

        let tool = Tool::new(
            "search_ops_events",
            "Search the operational event knowledge base",
            json!({"type": "object", "properties": {"query": {"type": "string"}},
                   "required": ["query"]}),
        );
        let messages = vec![Message::user().with_text("What happened to rds?")];
        let response = provider
            .converse(&model(), "system", &messages, &[tool], false)
            .await
            .unwrap();

        assert_eq!(response.stop_reason, StopReason::ToolUse);
        let requests = response.message.tool_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, "tu_1");
        assert_eq!(requests[0].call.name, "search_ops_events");
        assert_eq!(requests[0].call.arguments, json!({"query": "rds outage"}));
    }

    #[tokio::test]
    async fn test_throttling_is_transient() {
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(429).set_body_string("slow down")).await;

        let err = provider
            .converse(&model(), "system", &[Message::user().with_text("hi")], &[], false)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "expected transient, got {err:?}");
    }

    #[tokio::test]
    async fn test_bad_request_is_fatal() {
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(400).set_body_string("bad payload")).await;

        let err = provider
            .converse(&model(), "system", &[Message::user().with_text("hi")], &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_fatal() {
        let (_server, provider) = setup_mock_server(
            ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})),
        )
        .await;

        let err = provider
            .converse(&model(), "system", &[Message::user().with_text("hi")], &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Fatal(_)));
    }
}
