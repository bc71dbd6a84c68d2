//! Filtering, sorting and grouping over store snapshots.
//!
//! Everything here is a pure function of its inputs. Screens build a
//! [`LeadRow`] list once with [`resolve_leads`] and then narrow it.

use std::{cmp::Ordering, str::FromStr};

use shared::domain::{Agent, AgentId, Lead, LeadPriority, LeadStatus, UNASSIGNED_AGENT};

/// A lead together with the display name of its agent.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadRow {
    pub lead: Lead,
    pub agent_name: String,
}

impl LeadRow {
    pub fn is_assigned(&self) -> bool {
        self.lead.sales_agent.is_some() && self.agent_name != UNASSIGNED_AGENT
    }
}

pub fn resolve_leads(leads: &[Lead], agents: &[Agent]) -> Vec<LeadRow> {
    leads
        .iter()
        .map(|lead| LeadRow {
            agent_name: lead
                .sales_agent
                .as_ref()
                .and_then(|id| agents.iter().find(|agent| &agent.id == id))
                .map(|agent| agent.name.clone())
                .unwrap_or_else(|| UNASSIGNED_AGENT.to_string()),
            lead: lead.clone(),
        })
        .collect()
}

/// One filter dimension. `Any` places no restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    Any,
    Only(T),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::Any
    }
}

impl<T> Selection<T> {
    fn admits(&self, candidate: impl FnOnce(&T) -> bool) -> bool {
        match self {
            Selection::Any => true,
            Selection::Only(wanted) => candidate(wanted),
        }
    }
}

impl<T: FromStr> Selection<T> {
    /// `""` and `"all"` (any case) mean no restriction.
    pub fn parse(raw: &str) -> Result<Self, T::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            Ok(Selection::Any)
        } else {
            trimmed.parse().map(Selection::Only)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    pub status: Selection<LeadStatus>,
    /// Agent display name, matched exactly. Unassigned rows never match.
    pub agent: Selection<String>,
    pub priority: Selection<LeadPriority>,
}

impl LeadFilter {
    pub fn matches(&self, row: &LeadRow) -> bool {
        self.status.admits(|status| row.lead.status == *status)
            && self.priority.admits(|priority| row.lead.priority == *priority)
            && self
                .agent
                .admits(|name| row.is_assigned() && row.agent_name == name.trim())
    }
}

pub fn filter_leads(rows: &[LeadRow], filter: &LeadFilter) -> Vec<LeadRow> {
    rows.iter().filter(|row| filter.matches(row)).cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Unsorted,
    Name,
    Status,
    Priority,
    TimeToClose,
    Newest,
    Oldest,
}

impl SortKey {
    /// Lenient parse of the keys the screens use. Unknown keys keep input order.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "name" | "Name" => Self::Name,
            "status" | "Status" => Self::Status,
            "priority" | "Priority" => Self::Priority,
            "timeToClose" | "time_to_close" | "TimeToClose" => Self::TimeToClose,
            "Newest" | "newest" | "latest" | "createdAt" => Self::Newest,
            "Oldest" | "oldest" => Self::Oldest,
            _ => Self::Unsorted,
        }
    }

    fn compare(self, a: &Lead, b: &Lead) -> Ordering {
        match self {
            Self::Unsorted => Ordering::Equal,
            Self::Name => a.name.cmp(&b.name),
            Self::Status => a.status.rank().cmp(&b.status.rank()),
            Self::Priority => a.priority.rank().cmp(&b.priority.rank()),
            Self::TimeToClose => a.time_to_close.cmp(&b.time_to_close),
            Self::Newest => b.created_at.cmp(&a.created_at),
            Self::Oldest => a.created_at.cmp(&b.created_at),
        }
    }
}

/// Stable sort: ties keep their input order.
pub fn sort_leads(rows: &[LeadRow], key: SortKey) -> Vec<LeadRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| key.compare(&a.lead, &b.lead));
    sorted
}

/// Distinct agent names in first-seen order. Unassigned rows are skipped.
pub fn group_by_agent(rows: &[LeadRow]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows.iter().filter(|row| row.is_assigned()) {
        if !names.contains(&row.agent_name) {
            names.push(row.agent_name.clone());
        }
    }
    names
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeadScope {
    #[default]
    All,
    Active,
    Closed,
}

impl FromStr for LeadScope {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "active" | "open" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown lead scope '{other}'")),
        }
    }
}

pub fn scope_leads(rows: &[LeadRow], scope: LeadScope) -> Vec<LeadRow> {
    rows.iter()
        .filter(|row| match scope {
            LeadScope::All => true,
            LeadScope::Active => !row.lead.status.is_closed(),
            LeadScope::Closed => row.lead.status.is_closed(),
        })
        .cloned()
        .collect()
}

pub fn leads_for_agent(rows: &[LeadRow], agent_id: &AgentId) -> Vec<LeadRow> {
    rows.iter()
        .filter(|row| row.lead.sales_agent.as_ref() == Some(agent_id))
        .cloned()
        .collect()
}

/// Count per status, every status present, in declaration order.
pub fn status_counts(rows: &[LeadRow]) -> Vec<(LeadStatus, usize)> {
    LeadStatus::ALL
        .iter()
        .map(|status| {
            let count = rows.iter().filter(|row| row.lead.status == *status).count();
            (*status, count)
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/views_tests.rs"]
mod tests;
