//! Fixed toolbox of operational triage tools.
//!
//! Each tool dispatches to an injected collaborator trait so the toolbox
//! itself stays free of backend specifics. Handler faults are absorbed into
//! textual results; the conversation loop never sees an `Err` from here.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::params::{ParamSpec, ParamType, ToolSpec};
use super::ToolRegistry;
use crate::models::message::ToolOutput;
use crate::models::tool::Tool;

/// One ticket as stored by a `TicketStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: String,
    pub event_key: String,
    pub title: String,
    pub detail: String,
    pub recommendation: String,
    pub severity: String,
    pub assignee: String,
    pub progress: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to an existing ticket. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub recommendation: Option<String>,
    pub severity: Option<String>,
    pub assignee: Option<String>,
    pub progress: Option<String>,
}

impl TicketPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.detail.is_none()
            && self.recommendation.is_none()
            && self.severity.is_none()
            && self.assignee.is_none()
            && self.progress.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Keep the event for further triage
    Accept,
    /// Discharge the event as not actionable
    Discharge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexScope {
    Ops,
    Security,
}

/// One hit returned by an `EventIndex` search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHit {
    pub content: String,
    pub metadata: Value,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create(&self, record: TicketRecord) -> anyhow::Result<String>;
    async fn update(&self, id: &str, patch: TicketPatch) -> anyhow::Result<TicketRecord>;
    async fn search_by_event_key(&self, fragment: &str) -> anyhow::Result<Vec<TicketRecord>>;
}

#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn resolve(
        &self,
        token: &str,
        decision: AckDecision,
        reason: Option<&str>,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn send(&self, channel: &str, text: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn channel_for(&self, team: &str) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait EventIndex: Send + Sync {
    async fn search(&self, scope: IndexScope, query: &str) -> anyhow::Result<Vec<IndexHit>>;
}

const TICKET_FIELDS: [&str; 6] = [
    "ticket_title",
    "ticket_detail",
    "recommended_action",
    "severity",
    "assignee",
    "progress",
];

fn ticket_field_params(required_title: bool) -> Vec<ParamSpec> {
    TICKET_FIELDS
        .iter()
        .map(|name| {
            if *name == "ticket_title" && required_title {
                ParamSpec::required(*name, ParamType::String)
            } else {
                ParamSpec::optional(*name, ParamType::String)
            }
        })
        .collect()
}

fn toolbox_specs() -> Vec<ToolSpec> {
    let mut create_params = vec![ParamSpec::required("event_pk", ParamType::String)];
    create_params.extend(ticket_field_params(true));

    let mut update_params = vec![ParamSpec::required("ticket_id", ParamType::String)];
    update_params.extend(ticket_field_params(false));

    vec![
        ToolSpec::new(
            "search_ops_events",
            "Search the operational health event index for past operational events using natural language.",
            vec![ParamSpec::required("query", ParamType::String)],
        ),
        ToolSpec::new(
            "search_sec_findings",
            "Search the security findings index for past security findings using natural language.",
            vec![ParamSpec::required("query", ParamType::String)],
        ),
        ToolSpec::new(
            "acknowledge_event",
            "Acknowledge an operational event and specify the action to take: \
             'accept' for further triage or 'reject' to discharge it.",
            vec![
                ParamSpec::optional("callback_token", ParamType::String),
                ParamSpec::required("action_taken", ParamType::String),
                ParamSpec::optional("reason_for_action", ParamType::String),
            ],
        ),
        ToolSpec::new(
            "create_ticket",
            "Create a ticket based on an event or a situation description. Severity ranges \
             from 1 (lowest) to 5 (highest); the assignee is the owning team's id.",
            create_params,
        ),
        ToolSpec::new(
            "update_ticket",
            "Update an existing ticket with new information.",
            update_params,
        ),
        ToolSpec::new(
            "search_tickets_by_event_key",
            "Search for tickets associated with a specific event key. The event key is the \
             identifier of an operational event or the finding id of a security finding.",
            vec![ParamSpec::required("event_pk", ParamType::String)],
        ),
    ]
}

/// The fixed triage toolbox.
pub struct OpsToolbox {
    tickets: Arc<dyn TicketStore>,
    acknowledger: Arc<dyn Acknowledger>,
    notifier: Arc<dyn ChatNotifier>,
    directory: Arc<dyn TeamDirectory>,
    index: Arc<dyn EventIndex>,
    specs: Vec<ToolSpec>,
    tools: Vec<Tool>,
}

impl OpsToolbox {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        acknowledger: Arc<dyn Acknowledger>,
        notifier: Arc<dyn ChatNotifier>,
        directory: Arc<dyn TeamDirectory>,
        index: Arc<dyn EventIndex>,
    ) -> Self {
        let specs = toolbox_specs();
        let tools = specs.iter().map(ToolSpec::to_tool).collect();
        Self {
            tickets,
            acknowledger,
            notifier,
            directory,
            index,
            specs,
            tools,
        }
    }

    async fn search_index(&self, scope: IndexScope, args: &Map<String, Value>) -> ToolOutput {
        let key = match scope {
            IndexScope::Ops => "search_ops_events",
            IndexScope::Security => "search_sec_findings",
        };
        let query = str_arg(args, "query").unwrap_or_default();
        // Index faults degrade to an empty result set rather than an error
        // so the model keeps going with what it has.
        let hits = match self.index.search(scope, &query).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(scope = key, error = %err, "index search failed");
                Vec::new()
            }
        };
        ToolOutput::success(json!({ key: hits }).to_string())
    }

    async fn acknowledge(&self, args: &Map<String, Value>) -> ToolOutput {
        let token = str_arg(args, "callback_token").unwrap_or_default();
        if token.is_empty() {
            // No pending callback to resolve; acknowledge trivially.
            return ToolOutput::success(json!({"acknowledge_event": "success"}).to_string());
        }

        let action = str_arg(args, "action_taken").unwrap_or_default();
        let reason = str_arg(args, "reason_for_action");
        let decision = if action == "accept" {
            AckDecision::Accept
        } else {
            AckDecision::Discharge
        };

        match self
            .acknowledger
            .resolve(&token, decision, reason.as_deref())
            .await
        {
            Ok(()) => {
                let body = match decision {
                    AckDecision::Accept => "Acknowledged as accepted",
                    AckDecision::Discharge => "Acknowledged as discharged",
                };
                ToolOutput::success(json!({"acknowledge_event": body}).to_string())
            }
            Err(err) => {
                tracing::warn!(error = %err, "acknowledgement failed");
                ToolOutput::error(
                    "Acknowledgement failed, please verify if the callback token you used is correct.",
                )
            }
        }
    }

    async fn create_ticket(&self, args: &Map<String, Value>) -> ToolOutput {
        let now = Utc::now();
        let assignee = str_arg(args, "assignee").unwrap_or_default();
        let record = TicketRecord {
            id: uuid::Uuid::new_v4().to_string(),
            event_key: str_arg(args, "event_pk").unwrap_or_default(),
            title: str_arg(args, "ticket_title").unwrap_or_default(),
            detail: str_arg(args, "ticket_detail").unwrap_or_default(),
            recommendation: str_arg(args, "recommended_action").unwrap_or_default(),
            severity: str_arg(args, "severity").unwrap_or_default(),
            assignee: assignee.clone(),
            progress: str_arg(args, "progress").unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        let notification = format!(
            "You have been assigned a new ticket.\n TicketID: {}\n Title: {}\n Assigned to: {}\n Details: {}\n Severity: {}\n Recommendations: {}\n EventKey: {}",
            record.id,
            record.title,
            record.assignee,
            record.detail,
            record.severity,
            record.recommendation,
            record.event_key,
        );

        let ticket_id = match self.tickets.create(record).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(error = %err, "ticket creation failed");
                return ToolOutput::error(format!("Error creating ticket: {}", err));
            }
        };

        // A chat notification failure never fails the ticket creation.
        if !assignee.is_empty() {
            match self.directory.channel_for(&assignee).await {
                Ok(Some(channel)) => {
                    if let Err(err) = self.notifier.send(&channel, &notification).await {
                        tracing::warn!(channel = %channel, error = %err, "chat notification failed");
                    }
                }
                Ok(None) => {
                    tracing::warn!(team = %assignee, "no chat channel for team");
                }
                Err(err) => {
                    tracing::warn!(team = %assignee, error = %err, "team lookup failed");
                }
            }
        }

        ToolOutput::success(json!({"create_ticket": {"ticketId": ticket_id}}).to_string())
    }

    async fn update_ticket(&self, args: &Map<String, Value>) -> ToolOutput {
        let ticket_id = str_arg(args, "ticket_id").unwrap_or_default();
        let patch = TicketPatch {
            title: str_arg(args, "ticket_title"),
            detail: str_arg(args, "ticket_detail"),
            recommendation: str_arg(args, "recommended_action"),
            severity: str_arg(args, "severity"),
            assignee: str_arg(args, "assignee"),
            progress: str_arg(args, "progress"),
        };
        if patch.is_empty() {
            return ToolOutput::error("No fields to update");
        }

        match self.tickets.update(&ticket_id, patch).await {
            Ok(record) => ToolOutput::success(
                json!({"update_ticket": {"ticketId": record.id, "ticket": record}}).to_string(),
            ),
            Err(err) => {
                tracing::warn!(ticket_id = %ticket_id, error = %err, "ticket update failed");
                ToolOutput::error(format!("Error updating ticket: {}", err))
            }
        }
    }

    async fn search_tickets(&self, args: &Map<String, Value>) -> ToolOutput {
        let fragment = str_arg(args, "event_pk").unwrap_or_default();
        match self.tickets.search_by_event_key(&fragment).await {
            Ok(records) => ToolOutput::success(json!({"search_tickets": records}).to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "ticket search failed");
                ToolOutput::error(format!("Error searching tickets: {}", err))
            }
        }
    }
}

#[async_trait]
impl ToolRegistry for OpsToolbox {
    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, name: &str, arguments: Value) -> ToolOutput {
        let spec = match self.specs.iter().find(|s| s.name == name) {
            Some(spec) => spec,
            None => return ToolOutput::error(format!("Unknown tool: {}", name)),
        };
        let args = match spec.prepare(arguments) {
            Ok(args) => args,
            Err(reason) => return ToolOutput::error(reason),
        };

        match name {
            "search_ops_events" => self.search_index(IndexScope::Ops, &args).await,
            "search_sec_findings" => self.search_index(IndexScope::Security, &args).await,
            "acknowledge_event" => self.acknowledge(&args).await,
            "create_ticket" => self.create_ticket(&args).await,
            "update_ticket" => self.update_ticket(&args).await,
            "search_tickets_by_event_key" => self.search_tickets(&args).await,
            other => ToolOutput::error(format!("Unknown tool: {}", other)),
        }
    }
}

/// Extract a non-empty string argument. Empty strings count as absent,
/// matching how optional ticket fields behave.
fn str_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Default)]
struct MemoryOpsInner {
    tickets: Mutex<Vec<TicketRecord>>,
    acks: Mutex<Vec<(String, AckDecision, Option<String>)>>,
    messages: Mutex<Vec<(String, String)>>,
    teams: Mutex<HashMap<String, String>>,
    hits: Mutex<HashMap<&'static str, Vec<IndexHit>>>,
}

/// In-memory collaborators, shared by the local toolbox wiring and tests.
#[derive(Clone, Default)]
pub struct MemoryOps {
    inner: Arc<MemoryOpsInner>,
}

impl MemoryOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toolbox(&self) -> OpsToolbox {
        OpsToolbox::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }

    pub fn add_team<S: Into<String>, C: Into<String>>(&self, team: S, channel: C) {
        self.inner
            .teams
            .lock()
            .unwrap()
            .insert(team.into(), channel.into());
    }

    pub fn seed_hits(&self, scope: IndexScope, hits: Vec<IndexHit>) {
        self.inner.hits.lock().unwrap().insert(scope_key(scope), hits);
    }

    pub fn tickets(&self) -> Vec<TicketRecord> {
        self.inner.tickets.lock().unwrap().clone()
    }

    pub fn acknowledgements(&self) -> Vec<(String, AckDecision, Option<String>)> {
        self.inner.acks.lock().unwrap().clone()
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.inner.messages.lock().unwrap().clone()
    }
}

fn scope_key(scope: IndexScope) -> &'static str {
    match scope {
        IndexScope::Ops => "ops",
        IndexScope::Security => "security",
    }
}

#[async_trait]
impl TicketStore for MemoryOps {
    async fn create(&self, record: TicketRecord) -> anyhow::Result<String> {
        let id = record.id.clone();
        self.inner.tickets.lock().unwrap().push(record);
        Ok(id)
    }

    async fn update(&self, id: &str, patch: TicketPatch) -> anyhow::Result<TicketRecord> {
        let mut tickets = self.inner.tickets.lock().unwrap();
        let record = tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow::anyhow!("ticket {} not found", id))?;
        if let Some(title) = patch.title {
            record.title = title;
        }
        if let Some(detail) = patch.detail {
            record.detail = detail;
        }
        if let Some(recommendation) = patch.recommendation {
            record.recommendation = recommendation;
        }
        if let Some(severity) = patch.severity {
            record.severity = severity;
        }
        if let Some(assignee) = patch.assignee {
            record.assignee = assignee;
        }
        if let Some(progress) = patch.progress {
            record.progress = progress;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn search_by_event_key(&self, fragment: &str) -> anyhow::Result<Vec<TicketRecord>> {
        Ok(self
            .inner
            .tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.event_key.contains(fragment))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Acknowledger for MemoryOps {
    async fn resolve(
        &self,
        token: &str,
        decision: AckDecision,
        reason: Option<&str>,
    ) -> anyhow::Result<()> {
        self.inner.acks.lock().unwrap().push((
            token.to_string(),
            decision,
            reason.map(str::to_string),
        ));
        Ok(())
    }
}

#[async_trait]
impl ChatNotifier for MemoryOps {
    async fn send(&self, channel: &str, text: &str) -> anyhow::Result<()> {
        self.inner
            .messages
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl TeamDirectory for MemoryOps {
    async fn channel_for(&self, team: &str) -> anyhow::Result<Option<String>> {
        Ok(self.inner.teams.lock().unwrap().get(team).cloned())
    }
}

#[async_trait]
impl EventIndex for MemoryOps {
    async fn search(&self, scope: IndexScope, _query: &str) -> anyhow::Result<Vec<IndexHit>> {
        Ok(self
            .inner
            .hits
            .lock()
            .unwrap()
            .get(scope_key(scope))
            .cloned()
            .unwrap_or_default())
    }
}
