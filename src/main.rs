use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use ops_triage::agent::AgentSettings;
use ops_triage::config::Settings;
use ops_triage::handler::{Runtime, ToolSource, TriggerRequest};
use ops_triage::knowledge::KnowledgeStore;
use ops_triage::memory::{FileStore, MemoryStore};
use ops_triage::prompt_template::render_system_prompt;
use ops_triage::providers::base::Provider;
use ops_triage::providers::configs::default_chain;
use ops_triage::providers::converse::{ConverseProvider, ConverseProviderConfig};
use ops_triage::providers::fallback::FallbackProvider;
use ops_triage::registry::ops::MemoryOps;
use ops_triage::registry::remote::{CatalogClient, RemoteRegistry};
use ops_triage::registry::ToolRegistry;

/// Triage an operational event from the command line.
#[derive(Parser)]
#[command(name = "triage", version, about)]
struct Cli {
    /// Task text for the agent
    #[arg(long, conflicts_with_all = ["payload_key", "request_json"])]
    task: Option<String>,

    /// Key of a staged payload holding the task text
    #[arg(long, conflicts_with = "request_json")]
    payload_key: Option<String>,

    /// Session id to continue an earlier conversation
    #[arg(long)]
    session: Option<String>,

    /// Full trigger request as JSON, as delivered by the event bus
    #[arg(long)]
    request_json: Option<String>,
}

impl Cli {
    fn into_request(self) -> Result<TriggerRequest> {
        if let Some(raw) = self.request_json {
            return serde_json::from_str(&raw).context("parsing --request-json");
        }
        Ok(TriggerRequest {
            text: self.task,
            payload_key: self.payload_key,
            session_hint: self.session,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::new().context("loading settings from the environment")?;

    let gateway = ConverseProvider::new(ConverseProviderConfig {
        host: settings.provider.host.clone(),
        api_key: settings.provider.api_key.clone(),
    })?;
    let provider: Arc<dyn Provider> = Arc::new(
        FallbackProvider::new(gateway, default_chain())
            .with_start_index(settings.fallback.start_index)
            .with_max_retries_per_model(settings.fallback.max_retries_per_model)
            .with_retry_delay(settings.fallback.retry_delay()),
    );

    // Remote catalog when configured, otherwise the built-in toolbox with
    // in-memory collaborators.
    let (tool_source, advertised) = match &settings.catalog.endpoint {
        Some(endpoint) => {
            let client = CatalogClient::new(endpoint.clone())?;
            let advertised = match RemoteRegistry::discover(client.clone()).await {
                Ok(registry) => registry.tools().to_vec(),
                Err(err) => {
                    tracing::warn!(error = %err, "catalog not reachable at startup");
                    Vec::new()
                }
            };
            (ToolSource::Remote(client), advertised)
        }
        None => {
            let toolbox = MemoryOps::new().toolbox();
            let advertised = toolbox.tools().to_vec();
            (ToolSource::Fixed(Arc::new(toolbox)), advertised)
        }
    };
    let system_prompt = render_system_prompt(&advertised)?;

    let store = Arc::new(FileStore::new(settings.storage.data_dir.clone()));
    let runtime = Runtime {
        provider,
        tool_source,
        memory: MemoryStore::new(store.clone()),
        knowledge: KnowledgeStore::new(store.clone()),
        payloads: store,
        agent_settings: AgentSettings {
            name: settings.agent.name.clone(),
            max_steps: settings.agent.max_steps,
            cache_steps: settings.agent.cache_steps,
        },
        system_prompt,
    };

    let response = runtime.handle(cli.into_request()?).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
