use chrono::{DateTime, Duration, TimeZone, Utc};
use shared::domain::{
    Agent, AgentId, Lead, LeadId, LeadPriority, LeadSource, LeadStatus, Tag, TagId,
};

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid fixture time")
}

pub fn lead(id: &str, name: &str, status: LeadStatus, priority: LeadPriority) -> Lead {
    Lead {
        id: LeadId::from(id),
        name: name.to_string(),
        source: LeadSource::Website,
        status,
        priority,
        time_to_close: 10,
        sales_agent: None,
        tags: Vec::new(),
        created_at: epoch(),
        updated_at: None,
    }
}

pub fn lead_for(id: &str, name: &str, agent: &str) -> Lead {
    Lead {
        sales_agent: Some(AgentId::from(agent)),
        ..lead(id, name, LeadStatus::New, LeadPriority::Medium)
    }
}

pub fn created_minutes_after_epoch(mut lead: Lead, minutes: i64) -> Lead {
    lead.created_at = epoch() + Duration::minutes(minutes);
    lead
}

pub fn agent(id: &str, name: &str) -> Agent {
    Agent {
        id: AgentId::from(id),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_ascii_lowercase()),
        role: "Sales Agent".to_string(),
        created_at: epoch(),
    }
}

pub fn tag(id: &str, name: &str) -> Tag {
    Tag {
        id: TagId::from(id),
        name: name.to_string(),
    }
}
