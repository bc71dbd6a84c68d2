use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{
    Agent, AgentId, Comment, Lead, LeadId, LeadPriority, LeadSource, LeadStatus, Tag, TagId,
};

/// `{ "data": ... }` wrapper used by every successful response except comment listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

impl<T> DataEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadsPayload {
    pub leads: Vec<Lead>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadPayload {
    pub lead: Lead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsPayload {
    pub agents: Vec<Agent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPayload {
    pub agent: Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsPayload {
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagPayload {
    pub tag: Tag,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsEnvelope {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDraft {
    pub name: String,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub priority: LeadPriority,
    pub time_to_close: u32,
    #[serde(default)]
    pub sales_agent: Option<AgentId>,
    #[serde(default)]
    pub tags: Vec<TagId>,
}

/// Partial lead update. `sales_agent: Some(None)` serializes as `null` and unassigns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LeadSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<LeadPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_close: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub sales_agent: Option<Option<AgentId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagId>>,
}

impl LeadPatch {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDraft {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDraft {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub text: String,
    pub author: AgentId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAggregate {
    pub total_leads: u64,
    pub closed_leads: u64,
    pub active_leads: u64,
    pub average_time_to_close: f64,
    #[serde(default)]
    pub leads_by_status: BTreeMap<LeadStatus, u64>,
    #[serde(default)]
    pub leads_by_priority: BTreeMap<LeadPriority, u64>,
    #[serde(default)]
    pub leads_by_agent: Vec<AgentLeadCount>,
    #[serde(default)]
    pub recent_activity: Vec<LeadActivity>,
}

impl ReportAggregate {
    pub fn status_count(&self, status: LeadStatus) -> u64 {
        self.leads_by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn priority_count(&self, priority: LeadPriority) -> u64 {
        self.leads_by_priority.get(&priority).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLeadCount {
    #[serde(rename = "name", alias = "agentName")]
    pub agent_name: String,
    pub count: u64,
    #[serde(rename = "closed", alias = "closedCount")]
    pub closed_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadActivity {
    #[serde(rename = "_id", alias = "leadId")]
    pub lead_id: LeadId,
    pub name: String,
    pub status: LeadStatus,
    pub agent: String,
    pub updated_at: DateTime<Utc>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
