//! Markdown run reports persisted next to session memory.
use std::collections::BTreeMap;

use serde_json::Value;

use crate::agent::Outcome;
use crate::memory::ObjectStore;

/// Render one run as a markdown summary: the task, how many steps it took,
/// which tools were used with what parameters, and the final response.
pub fn render_report(agent: &str, task: &str, outcome: &Outcome) -> String {
    let mut report = format!(
        "# {} Run Summary\n\n## Task\n\n{}\n\n## Overview\n\n- Steps: {}\n- Tool calls: {}\n",
        agent,
        task,
        outcome.steps_taken,
        outcome.tool_calls.len()
    );

    if !outcome.tool_calls.is_empty() {
        report.push_str("\n## Tools Used\n");
        let mut by_tool: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
        for call in &outcome.tool_calls {
            by_tool.entry(&call.name).or_default().push(&call.input);
        }
        for (tool, inputs) in by_tool {
            report.push_str(&format!("\n### {}\n- Used {} time(s)\n", tool, inputs.len()));
            for (i, input) in inputs.iter().enumerate() {
                report.push_str(&format!("- Call {} parameters: `{}`\n", i + 1, input));
            }
        }
    }

    report.push_str(&format!("\n## Final Response\n\n{}\n", outcome.final_text));
    report
}

/// Stores run reports under `{agent}-knowledge/{session}.md`, with an
/// optional metadata sidecar.
pub struct KnowledgeStore<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> KnowledgeStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn save(
        &self,
        agent: &str,
        session: &str,
        report: &str,
        metadata: Option<&Value>,
    ) -> anyhow::Result<()> {
        let key = format!("{}-knowledge/{}.md", agent, session);
        if let Some(metadata) = metadata {
            self.store
                .put(
                    &format!("{}.metadata.json", key),
                    serde_json::to_vec(metadata)?,
                    "application/json",
                )
                .await?;
        }
        self.store
            .put(&key, report.as_bytes().to_vec(), "text/markdown")
            .await
    }
}
