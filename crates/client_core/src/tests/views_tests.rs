use super::*;

use crate::test_support::{agent, created_minutes_after_epoch, lead, lead_for};

fn rows() -> Vec<LeadRow> {
    let agents = vec![agent("a1", "Priya"), agent("a2", "Marco")];
    let mut acme = lead_for("l1", "Acme Corp", "a1");
    acme.status = LeadStatus::Qualified;
    acme.priority = LeadPriority::High;
    acme.time_to_close = 30;
    let mut globex = lead_for("l2", "Globex", "a2");
    globex.time_to_close = 5;
    globex.priority = LeadPriority::Low;
    let mut initech = lead_for("l3", "Initech", "a1");
    initech.time_to_close = 5;
    initech.status = LeadStatus::Closed;
    let orphan = lead("l4", "Umbrella", LeadStatus::New, LeadPriority::High);
    let leads = vec![
        created_minutes_after_epoch(acme, 10),
        created_minutes_after_epoch(globex, 30),
        created_minutes_after_epoch(initech, 20),
        created_minutes_after_epoch(orphan, 0),
    ];
    resolve_leads(&leads, &agents)
}

fn ids(rows: &[LeadRow]) -> Vec<&str> {
    rows.iter().map(|row| row.lead.id.as_str()).collect()
}

#[test]
fn agent_names_are_resolved_and_missing_ones_unassigned() {
    let leads = vec![
        lead_for("l1", "Acme", "a1"),
        lead_for("l2", "Globex", "gone"),
        lead("l3", "Initech", LeadStatus::New, LeadPriority::Low),
    ];
    let rows = resolve_leads(&leads, &[agent("a1", "Priya")]);
    let names: Vec<&str> = rows.iter().map(|row| row.agent_name.as_str()).collect();
    assert_eq!(names, vec!["Priya", "Unassigned", "Unassigned"]);
    assert!(rows[0].is_assigned());
    assert!(!rows[1].is_assigned());
    assert!(!rows[2].is_assigned());
}

#[test]
fn all_selections_keep_every_row() {
    let rows = rows();
    let filter = LeadFilter {
        status: Selection::parse("all").expect("status"),
        agent: Selection::parse("All").expect("agent"),
        priority: Selection::parse("").expect("priority"),
    };
    assert_eq!(filter, LeadFilter::default());
    assert_eq!(filter_leads(&rows, &filter), rows);
}

#[test]
fn filter_dimensions_combine_with_and() {
    let rows = rows();
    let by_agent = LeadFilter {
        agent: Selection::Only("Priya".into()),
        ..LeadFilter::default()
    };
    assert_eq!(ids(&filter_leads(&rows, &by_agent)), vec!["l1", "l3"]);

    let narrowed = LeadFilter {
        status: Selection::parse("Closed").expect("status"),
        ..by_agent.clone()
    };
    assert_eq!(ids(&filter_leads(&rows, &narrowed)), vec!["l3"]);

    let nothing = LeadFilter {
        priority: Selection::Only(LeadPriority::High),
        ..narrowed
    };
    assert!(filter_leads(&rows, &nothing).is_empty());
}

#[test]
fn agent_filter_matches_names_exactly() {
    let rows = rows();
    let lowercase = LeadFilter {
        agent: Selection::Only("priya".into()),
        ..LeadFilter::default()
    };
    assert!(filter_leads(&rows, &lowercase).is_empty());

    let placeholder = LeadFilter {
        agent: Selection::parse(UNASSIGNED_AGENT).expect("agent"),
        ..LeadFilter::default()
    };
    assert!(filter_leads(&rows, &placeholder).is_empty());
}

#[test]
fn unknown_filter_value_is_rejected() {
    assert!(Selection::<LeadStatus>::parse("Won").is_err());
}

#[test]
fn time_to_close_sort_is_stable() {
    let rows = rows();
    let sorted = sort_leads(&rows[..3], SortKey::parse("timeToClose"));
    let days: Vec<u32> = sorted.iter().map(|row| row.lead.time_to_close).collect();
    assert_eq!(days, vec![5, 5, 30]);
    assert_eq!(ids(&sorted), vec!["l2", "l3", "l1"]);
}

#[test]
fn status_and_priority_sort_by_pipeline_rank() {
    let rows = rows();
    assert_eq!(
        ids(&sort_leads(&rows, SortKey::Status)),
        vec!["l2", "l4", "l1", "l3"]
    );
    assert_eq!(
        ids(&sort_leads(&rows, SortKey::Priority)),
        vec!["l1", "l4", "l3", "l2"]
    );
}

#[test]
fn creation_time_sorts_both_ways() {
    let rows = rows();
    assert_eq!(
        ids(&sort_leads(&rows, SortKey::parse("Newest"))),
        vec!["l2", "l3", "l1", "l4"]
    );
    assert_eq!(
        ids(&sort_leads(&rows, SortKey::parse("oldest"))),
        vec!["l4", "l1", "l3", "l2"]
    );
}

#[test]
fn unknown_sort_key_keeps_input_order() {
    let rows = rows();
    assert_eq!(SortKey::parse("revenue"), SortKey::Unsorted);
    assert_eq!(sort_leads(&rows, SortKey::parse("revenue")), rows);
}

#[test]
fn grouping_lists_assigned_agents_once() {
    assert_eq!(group_by_agent(&rows()), vec!["Priya", "Marco"]);
}

#[test]
fn scopes_split_open_and_closed() {
    let rows = rows();
    let active = scope_leads(&rows, "active".parse().expect("scope"));
    assert_eq!(ids(&active), vec!["l1", "l2", "l4"]);
    assert_eq!(ids(&scope_leads(&rows, LeadScope::Closed)), vec!["l3"]);
    assert_eq!(scope_leads(&rows, LeadScope::All).len(), 4);
    assert!("archived".parse::<LeadScope>().is_err());
}

#[test]
fn agent_detail_lists_only_their_leads() {
    let rows = rows();
    let priya = leads_for_agent(&rows, &AgentId::from("a1"));
    assert_eq!(ids(&priya), vec!["l1", "l3"]);
    assert!(leads_for_agent(&rows, &AgentId::from("a9")).is_empty());
}

#[test]
fn status_counts_cover_every_status() {
    let counts = status_counts(&rows());
    assert_eq!(counts.len(), LeadStatus::ALL.len());
    let lookup = |status: LeadStatus| {
        counts
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap_or_default()
    };
    assert_eq!(lookup(LeadStatus::New), 2);
    assert_eq!(lookup(LeadStatus::Qualified), 1);
    assert_eq!(lookup(LeadStatus::Closed), 1);
    assert_eq!(lookup(LeadStatus::Contacted), 0);
}
