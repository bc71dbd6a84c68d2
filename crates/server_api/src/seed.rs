use chrono::{Duration, Utc};
use shared::domain::{
    Agent, AgentId, Comment, CommentId, Lead, LeadId, LeadPriority, LeadSource, LeadStatus, Tag,
    TagId, DEFAULT_AGENT_ROLE,
};

use crate::{next_id, PipelineTables};

/// Small fixture dataset so a fresh server has something to show.
pub(crate) fn demo_tables() -> PipelineTables {
    let now = Utc::now();

    let agents: Vec<Agent> = [
        ("Priya Raman", "priya@example.com"),
        ("Marcus Lee", "marcus@example.com"),
    ]
    .into_iter()
    .enumerate()
    .map(|(offset, (name, email))| Agent {
        id: AgentId::new(next_id()),
        name: name.to_string(),
        email: email.to_string(),
        role: DEFAULT_AGENT_ROLE.to_string(),
        created_at: now - Duration::days(30 - offset as i64),
    })
    .collect();

    let tags: Vec<Tag> = ["High Value", "Follow-up", "Enterprise"]
        .into_iter()
        .map(|name| Tag {
            id: TagId::new(next_id()),
            name: name.to_string(),
        })
        .collect();

    let lead = |name: &str,
                source: LeadSource,
                status: LeadStatus,
                priority: LeadPriority,
                time_to_close: u32,
                agent: Option<&Agent>,
                tag_ids: Vec<TagId>,
                age_days: i64| {
        let created_at = now - Duration::days(age_days);
        Lead {
            id: LeadId::new(next_id()),
            name: name.to_string(),
            source,
            status,
            priority,
            time_to_close,
            sales_agent: agent.map(|agent| agent.id.clone()),
            tags: tag_ids,
            created_at,
            updated_at: Some(created_at + Duration::hours(age_days)),
        }
    };

    let leads = vec![
        lead(
            "Acme Corp",
            LeadSource::Referral,
            LeadStatus::Qualified,
            LeadPriority::High,
            14,
            agents.first(),
            vec![tags[0].id.clone(), tags[2].id.clone()],
            10,
        ),
        lead(
            "Globex",
            LeadSource::Website,
            LeadStatus::New,
            LeadPriority::Medium,
            21,
            agents.get(1),
            vec![tags[1].id.clone()],
            6,
        ),
        lead(
            "Initech",
            LeadSource::ColdCall,
            LeadStatus::Closed,
            LeadPriority::Low,
            9,
            agents.first(),
            Vec::new(),
            20,
        ),
        lead(
            "Umbrella Health",
            LeadSource::Email,
            LeadStatus::ProposalSent,
            LeadPriority::High,
            30,
            None,
            vec![tags[2].id.clone()],
            3,
        ),
    ];

    let comments = agents
        .first()
        .map(|author| {
            vec![Comment {
                id: CommentId::new(next_id()),
                lead_id: leads[0].id.clone(),
                author: author.id.clone(),
                comment_text: "Intro call went well, sending pricing next.".to_string(),
                created_at: now - Duration::days(2),
            }]
        })
        .unwrap_or_default();

    PipelineTables {
        leads,
        agents,
        tags,
        comments,
    }
}
