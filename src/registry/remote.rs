use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::params::ToolSpec;
use super::ToolRegistry;
use crate::errors::CatalogError;
use crate::models::message::ToolOutput;
use crate::models::tool::Tool;

/// JSON-RPC 2.0 client for a remote tool catalog server.
///
/// Both methods post to the same endpoint: `tools/list` for discovery and
/// `tools/call` for execution.
#[derive(Clone, Debug)]
pub struct CatalogClient {
    http: Client,
    endpoint: String,
}

impl CatalogClient {
    pub fn new<S: Into<String>>(endpoint: S) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    async fn rpc(&self, method: &str, params: Option<Value>) -> Result<Value, String> {
        let mut payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
        });
        if let Some(params) = params {
            payload["params"] = params;
        }

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("catalog request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("catalog returned {}", status));
        }

        response
            .json()
            .await
            .map_err(|e| format!("malformed catalog response: {}", e))
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>, CatalogError> {
        let envelope = self
            .rpc("tools/list", None)
            .await
            .map_err(CatalogError::Unavailable)?;

        let tools = envelope
            .get("result")
            .and_then(|r| r.get("tools"))
            .and_then(|t| t.as_array())
            .ok_or_else(|| {
                CatalogError::Unavailable(format!("invalid discovery envelope: {}", envelope))
            })?;

        let mut specs = Vec::new();
        for tool in tools {
            let name = tool.get("name").and_then(|n| n.as_str()).ok_or_else(|| {
                CatalogError::Unavailable(format!("catalog entry without a name: {}", tool))
            })?;
            let description = tool
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("No description");
            let schema = tool.get("inputSchema").cloned().unwrap_or(json!({}));
            specs.push(ToolSpec::from_schema(name, description, &schema));
        }
        Ok(specs)
    }

    /// Execute one remote tool. Errors are returned as strings so callers
    /// can fold them into the conversation.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, String> {
        let envelope = self
            .rpc(
                "tools/call",
                Some(json!({"name": name, "arguments": arguments})),
            )
            .await
            .map_err(|e| format!("Tool execution failed: {}", e))?;

        if let Some(result) = envelope.get("result") {
            Ok(result.clone())
        } else if let Some(error) = envelope.get("error") {
            Err(format!("Error: {}", error))
        } else {
            Ok(envelope)
        }
    }
}

/// Tool registry backed by a dynamically discovered remote catalog.
///
/// Discovery happens once at construction; a failed or malformed discovery
/// is a hard `CatalogError`. Call-time faults never raise.
#[derive(Debug)]
pub struct RemoteRegistry {
    client: CatalogClient,
    specs: Vec<ToolSpec>,
    tools: Vec<Tool>,
}

impl RemoteRegistry {
    pub async fn discover(client: CatalogClient) -> Result<Self, CatalogError> {
        let specs = client.list_tools().await?;
        tracing::info!(count = specs.len(), "discovered remote tools");
        let tools = specs.iter().map(ToolSpec::to_tool).collect();
        Ok(Self {
            client,
            specs,
            tools,
        })
    }
}

#[async_trait]
impl ToolRegistry for RemoteRegistry {
    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, name: &str, arguments: Value) -> ToolOutput {
        let spec = match self.specs.iter().find(|s| s.name == name) {
            Some(spec) => spec,
            None => return ToolOutput::error(format!("Unknown tool: {}", name)),
        };

        let prepared = match spec.prepare(arguments) {
            Ok(prepared) => prepared,
            Err(reason) => return ToolOutput::error(reason),
        };

        match self.client.call_tool(name, prepared).await {
            Ok(result) => ToolOutput::success(extract_text(&result)),
            Err(reason) => ToolOutput::error(reason),
        }
    }
}

/// Pull the first textual content item out of a structured result
/// envelope, falling back to serializing the raw result.
fn extract_text(result: &Value) -> String {
    if let Some(items) = result.get("content").and_then(|c| c.as_array()) {
        if let Some(text) = items
            .iter()
            .find_map(|item| item.get("text").and_then(|t| t.as_str()))
        {
            return text.to_string();
        }
    }
    result.to_string()
}
