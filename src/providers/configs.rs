use serde::{Deserialize, Serialize};

/// An immutable descriptor for one candidate model in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    pub temperature: f32,
    /// Whether the model supports marking the system prompt as cacheable
    pub cache_prompt: bool,
    /// Whether the model supports marking the tool catalog as cacheable
    pub cache_tools: bool,
    /// Per-call timeout applied to each gateway request
    pub timeout_secs: u64,
}

impl ModelConfig {
    pub fn new<S: Into<String>>(model_id: S) -> Self {
        Self {
            model_id: model_id.into(),
            temperature: 0.0,
            cache_prompt: false,
            cache_tools: false,
            timeout_secs: 600,
        }
    }

    pub fn with_cache_prompt(mut self) -> Self {
        self.cache_prompt = true;
        self
    }

    pub fn with_cache_tools(mut self) -> Self {
        self.cache_tools = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The default fallback chain, ordered by ascending latency/cost.
///
/// The starting offset into this list is configured separately; the order
/// itself stays fixed for the whole process lifetime.
pub fn default_chain() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new("us.amazon.nova-pro-v1:0").with_cache_prompt(),
        ModelConfig::new("us.anthropic.claude-haiku-4-5-20251001-v1:0").with_cache_prompt(),
        ModelConfig::new("global.anthropic.claude-sonnet-4-20250514-v1:0").with_cache_prompt(),
        ModelConfig::new("us.anthropic.claude-3-7-sonnet-20250219-v1:0").with_cache_prompt(),
        ModelConfig::new("global.anthropic.claude-sonnet-4-5-20250929-v1:0").with_cache_prompt(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let model = ModelConfig::new("test-model");
        assert_eq!(model.temperature, 0.0);
        assert!(!model.cache_prompt);
        assert_eq!(model.timeout_secs, 600);
    }

    #[test]
    fn test_default_chain_is_nonempty() {
        let chain = default_chain();
        assert!(chain.len() >= 2);
        assert!(chain.iter().all(|m| m.cache_prompt));
    }
}
