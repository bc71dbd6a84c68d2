//! Plain-text rendering of store snapshots and report aggregates.

use std::fmt::Write as _;

use client_core::LeadRow;
use shared::{
    domain::{Agent, Comment, LeadPriority, LeadStatus, Tag},
    protocol::ReportAggregate,
};

const BAR_WIDTH: u64 = 30;

pub fn lead_table(rows: &[LeadRow], tags: &[Tag]) -> String {
    if rows.is_empty() {
        return "no leads match\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24} {:<14} {:<8} {:<18} {:>5}  {}",
        "NAME", "STATUS", "PRIORITY", "AGENT", "DAYS", "TAGS"
    );
    for row in rows {
        let tag_names: Vec<&str> = row
            .lead
            .tags
            .iter()
            .filter_map(|id| tags.iter().find(|tag| &tag.id == id))
            .map(|tag| tag.name.as_str())
            .collect();
        let _ = writeln!(
            out,
            "{:<24} {:<14} {:<8} {:<18} {:>5}  {}",
            truncate(&row.lead.name, 24),
            row.lead.status,
            row.lead.priority,
            truncate(&row.agent_name, 18),
            row.lead.time_to_close,
            tag_names.join(", ")
        );
        let _ = writeln!(out, "  id {}", row.lead.id);
    }
    out
}

pub fn agent_table(agents: &[Agent], rows: &[LeadRow]) -> String {
    if agents.is_empty() {
        return "no agents\n".to_string();
    }
    let mut out = String::new();
    for agent in agents {
        let owned = rows
            .iter()
            .filter(|row| row.lead.sales_agent.as_ref() == Some(&agent.id))
            .count();
        let _ = writeln!(
            out,
            "{} <{}> {} leads={owned} id={}",
            agent.name, agent.email, agent.role, agent.id
        );
    }
    out
}

pub fn tag_list(tags: &[Tag]) -> String {
    tags.iter().fold(String::new(), |mut out, tag| {
        let _ = writeln!(out, "{} id={}", tag.name, tag.id);
        out
    })
}

pub fn comment_list(comments: &[Comment], agents: &[Agent]) -> String {
    if comments.is_empty() {
        return "no comments\n".to_string();
    }
    let mut out = String::new();
    for comment in comments {
        let author = agents
            .iter()
            .find(|agent| agent.id == comment.author)
            .map(|agent| agent.name.as_str())
            .unwrap_or(comment.author.as_str());
        let _ = writeln!(
            out,
            "[{}] {author}: {}",
            comment.created_at.format("%Y-%m-%d %H:%M"),
            comment.comment_text
        );
    }
    out
}

/// Totals, distribution bars, agent ranking and recent activity.
pub fn report(report: &ReportAggregate) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "total {}  active {}  closed {}  avg days to close {:.1}",
        report.total_leads, report.active_leads, report.closed_leads, report.average_time_to_close
    );

    out.push_str("\nby status\n");
    let statuses: Vec<(String, u64)> = LeadStatus::ALL
        .iter()
        .map(|status| (status.to_string(), report.status_count(*status)))
        .collect();
    out.push_str(&bars(&statuses));

    out.push_str("\nby priority\n");
    let priorities: Vec<(String, u64)> = LeadPriority::ALL
        .iter()
        .map(|priority| (priority.to_string(), report.priority_count(*priority)))
        .collect();
    out.push_str(&bars(&priorities));

    if !report.leads_by_agent.is_empty() {
        out.push_str("\nby agent\n");
        for entry in &report.leads_by_agent {
            let _ = writeln!(
                out,
                "  {:<18} {:>3} ({} closed)",
                entry.agent_name, entry.count, entry.closed_count
            );
        }
    }

    if !report.recent_activity.is_empty() {
        out.push_str("\nrecent activity\n");
        for activity in &report.recent_activity {
            let _ = writeln!(
                out,
                "  {} {} -> {} ({})",
                activity.updated_at.format("%Y-%m-%d %H:%M"),
                activity.name,
                activity.status,
                activity.agent
            );
        }
    }
    out
}

fn bars(counts: &[(String, u64)]) -> String {
    let max = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let mut out = String::new();
    for (label, count) in counts {
        let width = if max == 0 { 0 } else { count * BAR_WIDTH / max };
        let _ = writeln!(
            out,
            "  {label:<14} {:>3} {}",
            count,
            "#".repeat(width as usize)
        );
    }
    out
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut cut: String = value.chars().take(width.saturating_sub(1)).collect();
    cut.push('~');
    cut
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
