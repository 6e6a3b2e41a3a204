//! Runtime settings layered from environment variables.
//!
//! Variables use the `TRIAGE` prefix with `__` between sections, e.g.
//! `TRIAGE_PROVIDER__API_KEY` or `TRIAGE_FALLBACK__START_INDEX`.
use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    pub host: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct FallbackSettings {
    #[serde(default = "default_start_index")]
    pub start_index: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries_per_model: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            start_index: default_start_index(),
            max_retries_per_model: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl FallbackSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentOptions {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_cache_steps")]
    pub cache_steps: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_steps: default_max_steps(),
            cache_steps: default_cache_steps(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogSettings {
    /// JSON-RPC endpoint for remote tool discovery; the local toolbox is
    /// used when unset
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub fallback: FallbackSettings,
    #[serde(default)]
    pub agent: AgentOptions,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("TRIAGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        config.try_deserialize()
    }
}

fn default_start_index() -> usize {
    2
}

fn default_max_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_agent_name() -> String {
    "ops_agent".to_string()
}

fn default_max_steps() -> usize {
    6
}

fn default_cache_steps() -> usize {
    4
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("ops-triage").to_string_lossy().to_string())
        .unwrap_or_else(|| ".ops-triage".to_string())
}
