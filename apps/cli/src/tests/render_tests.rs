use super::*;

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use client_core::views::resolve_leads;
use shared::{
    domain::{AgentId, CommentId, Lead, LeadId, LeadSource, TagId},
    protocol::{AgentLeadCount, LeadActivity},
};

fn at(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0)
        .single()
        .expect("fixture time")
}

fn priya() -> Agent {
    Agent {
        id: AgentId::from("a1"),
        name: "Priya Raman".into(),
        email: "priya@example.com".into(),
        role: "Sales Agent".into(),
        created_at: at(8),
    }
}

fn acme() -> Lead {
    Lead {
        id: LeadId::from("l1"),
        name: "Acme Corp".into(),
        source: LeadSource::Referral,
        status: LeadStatus::Qualified,
        priority: LeadPriority::High,
        time_to_close: 14,
        sales_agent: Some(AgentId::from("a1")),
        tags: vec![TagId::from("t1")],
        created_at: at(9),
        updated_at: None,
    }
}

#[test]
fn lead_table_shows_agent_and_tag_names() {
    let rows = resolve_leads(&[acme()], &[priya()]);
    let tags = vec![Tag {
        id: TagId::from("t1"),
        name: "Enterprise".into(),
    }];
    let table = lead_table(&rows, &tags);
    let line = table.lines().nth(1).expect("lead line");
    assert!(line.starts_with("Acme Corp"));
    assert!(line.contains("Qualified"));
    assert!(line.contains("Priya Raman"));
    assert!(line.ends_with("Enterprise"));
    assert!(table.contains("id l1"));
    assert_eq!(lead_table(&[], &tags), "no leads match\n");
}

#[test]
fn long_names_are_cut_to_column_width() {
    assert_eq!(truncate("Short", 10), "Short");
    assert_eq!(truncate("Consolidated Holdings", 10), "Consolida~");
}

#[test]
fn agent_table_counts_owned_leads() {
    let rows = resolve_leads(&[acme()], &[priya()]);
    let table = agent_table(&[priya()], &rows);
    assert_eq!(
        table,
        "Priya Raman <priya@example.com> Sales Agent leads=1 id=a1\n"
    );
}

#[test]
fn comments_fall_back_to_author_id() {
    let comment = Comment {
        id: CommentId::from("c1"),
        lead_id: LeadId::from("l1"),
        author: AgentId::from("gone"),
        comment_text: "Sent pricing".into(),
        created_at: at(10),
    };
    assert_eq!(
        comment_list(&[comment], &[priya()]),
        "[2024-05-01 10:00] gone: Sent pricing\n"
    );
}

#[test]
fn report_scales_bars_to_largest_bucket() {
    let aggregate = ReportAggregate {
        total_leads: 3,
        closed_leads: 1,
        active_leads: 2,
        average_time_to_close: 14.0,
        leads_by_status: BTreeMap::from([
            (LeadStatus::New, 2),
            (LeadStatus::Closed, 1),
        ]),
        leads_by_priority: BTreeMap::new(),
        leads_by_agent: vec![AgentLeadCount {
            agent_name: "Priya Raman".into(),
            count: 3,
            closed_count: 1,
        }],
        recent_activity: vec![LeadActivity {
            lead_id: LeadId::from("l1"),
            name: "Acme Corp".into(),
            status: LeadStatus::Closed,
            agent: "Priya Raman".into(),
            updated_at: at(11),
        }],
    };
    let text = report(&aggregate);

    assert!(text.starts_with("total 3  active 2  closed 1  avg days to close 14.0\n"));
    let new_line = text
        .lines()
        .find(|line| line.trim_start().starts_with("New"))
        .expect("new bucket");
    assert!(new_line.ends_with(&"#".repeat(30)));
    let closed_line = text
        .lines()
        .find(|line| line.trim_start().starts_with("Closed"))
        .expect("closed bucket");
    assert!(closed_line.ends_with(&format!(" {}", "#".repeat(15))));
    assert!(text.contains("Contacted"));
    assert!(text.contains("Priya Raman          3 (1 closed)"));
    assert!(text.contains("Acme Corp -> Closed (Priya Raman)"));
}
