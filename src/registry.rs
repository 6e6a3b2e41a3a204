//! Tool catalogs the conversation loop can draw from.
//!
//! Two sourcing modes share one contract: a fixed, hand-written toolbox of
//! operational tools, and a dynamically discovered remote catalog. Listing
//! tools can fail at construction time; calling a tool never fails — every
//! fault is folded into an error-status textual result so the model can
//! react to it inside the conversation.
use async_trait::async_trait;
use serde_json::Value;

use crate::models::message::ToolOutput;
use crate::models::tool::Tool;

pub mod ops;
pub mod params;
pub mod remote;

#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// The catalog advertised to the model
    fn tools(&self) -> &[Tool];

    /// Execute one tool call. Never raises; all failure modes surface as an
    /// error-status result.
    async fn call(&self, name: &str, arguments: Value) -> ToolOutput;
}
