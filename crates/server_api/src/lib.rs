use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use shared::{
    domain::{Agent, AgentId, Comment, CommentId, Lead, LeadId, Tag, TagId, DEFAULT_AGENT_ROLE},
    error::ApiError,
    protocol::{
        AgentDraft, AgentPatch, CommentDraft, CommentPatch, LeadDraft, LeadPatch, ReportAggregate,
        TagDraft, TagPatch,
    },
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

mod report;
mod seed;

pub use report::{compute_report, RECENT_ACTIVITY_LIMIT};

#[derive(Default)]
struct PipelineTables {
    leads: Vec<Lead>,
    agents: Vec<Agent>,
    tags: Vec<Tag>,
    comments: Vec<Comment>,
}

/// In-memory pipeline service state shared by every request handler.
#[derive(Clone, Default)]
pub struct ApiContext {
    tables: Arc<RwLock<PipelineTables>>,
}

impl ApiContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demo_data() -> Self {
        Self {
            tables: Arc::new(RwLock::new(seed::demo_tables())),
        }
    }
}

pub async fn list_leads(ctx: &ApiContext) -> Result<Vec<Lead>, ApiError> {
    Ok(ctx.tables.read().await.leads.clone())
}

pub async fn get_lead(ctx: &ApiContext, lead_id: &LeadId) -> Result<Lead, ApiError> {
    let tables = ctx.tables.read().await;
    let index = tables.lead_index(lead_id)?;
    Ok(tables.leads[index].clone())
}

pub async fn create_lead(ctx: &ApiContext, draft: LeadDraft) -> Result<Lead, ApiError> {
    let name = required_text(&draft.name, "Lead name")?;
    let mut tables = ctx.tables.write().await;
    if let Some(agent_id) = &draft.sales_agent {
        tables.ensure_agent(agent_id)?;
    }
    let tags = dedupe_tags(draft.tags);
    tables.ensure_tags(&tags)?;

    let now = Utc::now();
    let lead = Lead {
        id: LeadId::new(next_id()),
        name,
        source: draft.source,
        status: draft.status,
        priority: draft.priority,
        time_to_close: draft.time_to_close,
        sales_agent: draft.sales_agent,
        tags,
        created_at: now,
        updated_at: Some(now),
    };
    tables.leads.push(lead.clone());
    info!(lead_id = %lead.id, "api: lead created");
    Ok(lead)
}

pub async fn update_lead(
    ctx: &ApiContext,
    lead_id: &LeadId,
    patch: LeadPatch,
) -> Result<Lead, ApiError> {
    let mut tables = ctx.tables.write().await;
    let index = tables.lead_index(lead_id)?;
    if let Some(Some(agent_id)) = &patch.sales_agent {
        tables.ensure_agent(agent_id)?;
    }
    let tags = patch.tags.map(dedupe_tags);
    if let Some(tags) = &tags {
        tables.ensure_tags(tags)?;
    }
    let name = patch
        .name
        .as_deref()
        .map(|name| required_text(name, "Lead name"))
        .transpose()?;

    let lead = &mut tables.leads[index];
    if let Some(name) = name {
        lead.name = name;
    }
    if let Some(source) = patch.source {
        lead.source = source;
    }
    if let Some(status) = patch.status {
        lead.status = status;
    }
    if let Some(priority) = patch.priority {
        lead.priority = priority;
    }
    if let Some(time_to_close) = patch.time_to_close {
        lead.time_to_close = time_to_close;
    }
    if let Some(sales_agent) = patch.sales_agent {
        lead.sales_agent = sales_agent;
    }
    if let Some(tags) = tags {
        lead.tags = tags;
    }
    lead.updated_at = Some(Utc::now());
    Ok(lead.clone())
}

pub async fn delete_lead(ctx: &ApiContext, lead_id: &LeadId) -> Result<(), ApiError> {
    let mut tables = ctx.tables.write().await;
    let index = tables.lead_index(lead_id)?;
    tables.leads.remove(index);
    tables.comments.retain(|comment| &comment.lead_id != lead_id);
    info!(lead_id = %lead_id, "api: lead deleted");
    Ok(())
}

pub async fn list_agents(ctx: &ApiContext) -> Result<Vec<Agent>, ApiError> {
    Ok(ctx.tables.read().await.agents.clone())
}

pub async fn get_agent(ctx: &ApiContext, agent_id: &AgentId) -> Result<Agent, ApiError> {
    let tables = ctx.tables.read().await;
    let index = tables.agent_index(agent_id)?;
    Ok(tables.agents[index].clone())
}

pub async fn create_agent(ctx: &ApiContext, draft: AgentDraft) -> Result<Agent, ApiError> {
    let name = required_text(&draft.name, "Agent name")?;
    let email = valid_email(&draft.email)?;
    let mut tables = ctx.tables.write().await;
    tables.ensure_unique_email(&email, None)?;

    let agent = Agent {
        id: AgentId::new(next_id()),
        name,
        email,
        role: draft
            .role
            .map(|role| role.trim().to_string())
            .filter(|role| !role.is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT_ROLE.to_string()),
        created_at: Utc::now(),
    };
    tables.agents.push(agent.clone());
    info!(agent_id = %agent.id, "api: agent created");
    Ok(agent)
}

pub async fn update_agent(
    ctx: &ApiContext,
    agent_id: &AgentId,
    patch: AgentPatch,
) -> Result<Agent, ApiError> {
    let mut tables = ctx.tables.write().await;
    let index = tables.agent_index(agent_id)?;
    let name = patch
        .name
        .as_deref()
        .map(|name| required_text(name, "Agent name"))
        .transpose()?;
    let email = patch.email.as_deref().map(valid_email).transpose()?;
    if let Some(email) = &email {
        tables.ensure_unique_email(email, Some(agent_id))?;
    }

    let agent = &mut tables.agents[index];
    if let Some(name) = name {
        agent.name = name;
    }
    if let Some(email) = email {
        agent.email = email;
    }
    if let Some(role) = patch.role {
        let role = role.trim();
        agent.role = if role.is_empty() {
            DEFAULT_AGENT_ROLE.to_string()
        } else {
            role.to_string()
        };
    }
    Ok(agent.clone())
}

/// Deletes an agent and unassigns every lead it owned.
pub async fn delete_agent(ctx: &ApiContext, agent_id: &AgentId) -> Result<(), ApiError> {
    let mut tables = ctx.tables.write().await;
    let index = tables.agent_index(agent_id)?;
    tables.agents.remove(index);
    let now = Utc::now();
    let mut unassigned = 0usize;
    for lead in tables
        .leads
        .iter_mut()
        .filter(|lead| lead.sales_agent.as_ref() == Some(agent_id))
    {
        lead.sales_agent = None;
        lead.updated_at = Some(now);
        unassigned += 1;
    }
    info!(agent_id = %agent_id, unassigned, "api: agent deleted");
    Ok(())
}

pub async fn list_tags(ctx: &ApiContext) -> Result<Vec<Tag>, ApiError> {
    Ok(ctx.tables.read().await.tags.clone())
}

pub async fn get_tag(ctx: &ApiContext, tag_id: &TagId) -> Result<Tag, ApiError> {
    let tables = ctx.tables.read().await;
    let index = tables.tag_index(tag_id)?;
    Ok(tables.tags[index].clone())
}

pub async fn create_tag(ctx: &ApiContext, draft: TagDraft) -> Result<Tag, ApiError> {
    let name = required_text(&draft.name, "Tag name")?;
    let mut tables = ctx.tables.write().await;
    tables.ensure_unique_tag(&name, None)?;
    let tag = Tag {
        id: TagId::new(next_id()),
        name,
    };
    tables.tags.push(tag.clone());
    Ok(tag)
}

pub async fn update_tag(ctx: &ApiContext, tag_id: &TagId, patch: TagPatch) -> Result<Tag, ApiError> {
    let mut tables = ctx.tables.write().await;
    let index = tables.tag_index(tag_id)?;
    if let Some(name) = patch.name {
        let name = required_text(&name, "Tag name")?;
        tables.ensure_unique_tag(&name, Some(tag_id))?;
        tables.tags[index].name = name;
    }
    Ok(tables.tags[index].clone())
}

/// Deletes a tag and strips it from every lead carrying it.
pub async fn delete_tag(ctx: &ApiContext, tag_id: &TagId) -> Result<(), ApiError> {
    let mut tables = ctx.tables.write().await;
    let index = tables.tag_index(tag_id)?;
    tables.tags.remove(index);
    for lead in tables.leads.iter_mut() {
        lead.tags.retain(|tag| tag != tag_id);
    }
    Ok(())
}

/// Comments of a lead, newest first.
pub async fn list_comments(ctx: &ApiContext, lead_id: &LeadId) -> Result<Vec<Comment>, ApiError> {
    let tables = ctx.tables.read().await;
    tables.lead_index(lead_id)?;
    let mut comments: Vec<Comment> = tables
        .comments
        .iter()
        .filter(|comment| &comment.lead_id == lead_id)
        .cloned()
        .collect();
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(comments)
}

pub async fn get_comment(
    ctx: &ApiContext,
    lead_id: &LeadId,
    comment_id: &CommentId,
) -> Result<Comment, ApiError> {
    let tables = ctx.tables.read().await;
    let index = tables.comment_index(lead_id, comment_id)?;
    Ok(tables.comments[index].clone())
}

pub async fn add_comment(
    ctx: &ApiContext,
    lead_id: &LeadId,
    draft: CommentDraft,
) -> Result<Comment, ApiError> {
    let text = required_text(&draft.text, "Comment text")?;
    let mut tables = ctx.tables.write().await;
    tables.lead_index(lead_id)?;
    tables
        .ensure_agent(&draft.author)
        .map_err(|_| ApiError::validation("Comment author must be an existing agent"))?;

    let comment = Comment {
        id: CommentId::new(next_id()),
        lead_id: lead_id.clone(),
        author: draft.author,
        comment_text: text,
        created_at: Utc::now(),
    };
    tables.comments.push(comment.clone());
    Ok(comment)
}

pub async fn update_comment(
    ctx: &ApiContext,
    lead_id: &LeadId,
    comment_id: &CommentId,
    patch: CommentPatch,
) -> Result<Comment, ApiError> {
    let mut tables = ctx.tables.write().await;
    let index = tables.comment_index(lead_id, comment_id)?;
    if let Some(text) = patch.text {
        tables.comments[index].comment_text = required_text(&text, "Comment text")?;
    }
    Ok(tables.comments[index].clone())
}

pub async fn delete_comment(
    ctx: &ApiContext,
    lead_id: &LeadId,
    comment_id: &CommentId,
) -> Result<(), ApiError> {
    let mut tables = ctx.tables.write().await;
    let index = tables.comment_index(lead_id, comment_id)?;
    tables.comments.remove(index);
    Ok(())
}

pub async fn report(ctx: &ApiContext) -> Result<ReportAggregate, ApiError> {
    let tables = ctx.tables.read().await;
    Ok(compute_report(&tables.leads, &tables.agents))
}

impl PipelineTables {
    fn lead_index(&self, lead_id: &LeadId) -> Result<usize, ApiError> {
        self.leads
            .iter()
            .position(|lead| &lead.id == lead_id)
            .ok_or_else(|| ApiError::not_found("Lead not found"))
    }

    fn agent_index(&self, agent_id: &AgentId) -> Result<usize, ApiError> {
        self.agents
            .iter()
            .position(|agent| &agent.id == agent_id)
            .ok_or_else(|| ApiError::not_found("Agent not found"))
    }

    fn tag_index(&self, tag_id: &TagId) -> Result<usize, ApiError> {
        self.tags
            .iter()
            .position(|tag| &tag.id == tag_id)
            .ok_or_else(|| ApiError::not_found("Tag not found"))
    }

    fn comment_index(&self, lead_id: &LeadId, comment_id: &CommentId) -> Result<usize, ApiError> {
        self.lead_index(lead_id)?;
        self.comments
            .iter()
            .position(|comment| &comment.id == comment_id && &comment.lead_id == lead_id)
            .ok_or_else(|| ApiError::not_found("Comment not found"))
    }

    fn ensure_agent(&self, agent_id: &AgentId) -> Result<(), ApiError> {
        if self.agents.iter().any(|agent| &agent.id == agent_id) {
            Ok(())
        } else {
            Err(ApiError::validation(format!(
                "Sales agent {agent_id} does not exist"
            )))
        }
    }

    fn ensure_tags(&self, tags: &[TagId]) -> Result<(), ApiError> {
        match tags
            .iter()
            .find(|tag_id| !self.tags.iter().any(|tag| &tag.id == *tag_id))
        {
            Some(missing) => Err(ApiError::validation(format!("Tag {missing} does not exist"))),
            None => Ok(()),
        }
    }

    fn ensure_unique_email(&self, email: &str, except: Option<&AgentId>) -> Result<(), ApiError> {
        let taken = self
            .agents
            .iter()
            .filter(|agent| Some(&agent.id) != except)
            .any(|agent| agent.email.eq_ignore_ascii_case(email));
        if taken {
            Err(ApiError::conflict(format!(
                "Agent with email '{email}' already exists"
            )))
        } else {
            Ok(())
        }
    }

    fn ensure_unique_tag(&self, name: &str, except: Option<&TagId>) -> Result<(), ApiError> {
        let taken = self
            .tags
            .iter()
            .filter(|tag| Some(&tag.id) != except)
            .any(|tag| tag.name.eq_ignore_ascii_case(name));
        if taken {
            Err(ApiError::conflict(format!("Tag '{name}' already exists")))
        } else {
            Ok(())
        }
    }
}

fn next_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn required_text(value: &str, label: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{label} is required")));
    }
    Ok(trimmed.to_string())
}

fn valid_email(value: &str) -> Result<String, ApiError> {
    let email = required_text(value, "Agent email")?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::validation(format!("'{email}' is not a valid email"))),
    }
}

fn dedupe_tags(tags: Vec<TagId>) -> Vec<TagId> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
