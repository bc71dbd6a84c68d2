use std::collections::BTreeMap;

use shared::{
    domain::{Agent, Lead, LeadPriority, LeadStatus, UNASSIGNED_AGENT},
    protocol::{AgentLeadCount, LeadActivity, ReportAggregate},
};

pub const RECENT_ACTIVITY_LIMIT: usize = 5;

/// Builds the dashboard aggregate from the current lead and agent tables.
pub fn compute_report(leads: &[Lead], agents: &[Agent]) -> ReportAggregate {
    let mut leads_by_status: BTreeMap<LeadStatus, u64> =
        LeadStatus::ALL.iter().map(|status| (*status, 0)).collect();
    let mut leads_by_priority: BTreeMap<LeadPriority, u64> =
        LeadPriority::ALL.iter().map(|priority| (*priority, 0)).collect();

    let mut closed_leads = 0u64;
    let mut closed_days = 0u64;
    for lead in leads {
        *leads_by_status.entry(lead.status).or_default() += 1;
        *leads_by_priority.entry(lead.priority).or_default() += 1;
        if lead.status.is_closed() {
            closed_leads += 1;
            closed_days += u64::from(lead.time_to_close);
        }
    }

    let average_time_to_close = if closed_leads == 0 {
        0.0
    } else {
        closed_days as f64 / closed_leads as f64
    };

    let mut leads_by_agent: Vec<AgentLeadCount> = agents
        .iter()
        .map(|agent| {
            let owned = leads
                .iter()
                .filter(|lead| lead.sales_agent.as_ref() == Some(&agent.id));
            let (count, closed_count) = owned.fold((0, 0), |(count, closed), lead| {
                (count + 1, closed + u64::from(lead.status.is_closed()))
            });
            AgentLeadCount {
                agent_name: agent.name.clone(),
                count,
                closed_count,
            }
        })
        .collect();
    leads_by_agent.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.agent_name.cmp(&b.agent_name))
    });

    let mut recent: Vec<&Lead> = leads.iter().collect();
    recent.sort_by_key(|lead| std::cmp::Reverse(lead.updated_at.unwrap_or(lead.created_at)));
    let recent_activity = recent
        .into_iter()
        .take(RECENT_ACTIVITY_LIMIT)
        .map(|lead| LeadActivity {
            lead_id: lead.id.clone(),
            name: lead.name.clone(),
            status: lead.status,
            agent: lead
                .sales_agent
                .as_ref()
                .and_then(|id| agents.iter().find(|agent| &agent.id == id))
                .map(|agent| agent.name.clone())
                .unwrap_or_else(|| UNASSIGNED_AGENT.to_string()),
            updated_at: lead.updated_at.unwrap_or(lead.created_at),
        })
        .collect();

    let total_leads = leads.len() as u64;
    ReportAggregate {
        total_leads,
        closed_leads,
        active_leads: total_leads - closed_leads,
        average_time_to_close,
        leads_by_status,
        leads_by_priority,
        leads_by_agent,
        recent_activity,
    }
}
