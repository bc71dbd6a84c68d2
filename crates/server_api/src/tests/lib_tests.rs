use super::*;
use shared::{
    domain::{LeadPriority, LeadSource, LeadStatus, UNASSIGNED_AGENT},
    error::ErrorCode,
};

fn lead_draft(name: &str) -> LeadDraft {
    LeadDraft {
        name: name.into(),
        source: LeadSource::Website,
        status: LeadStatus::New,
        priority: LeadPriority::Medium,
        time_to_close: 10,
        sales_agent: None,
        tags: Vec::new(),
    }
}

async fn agent(ctx: &ApiContext, name: &str, email: &str) -> Agent {
    create_agent(
        ctx,
        AgentDraft {
            name: name.into(),
            email: email.into(),
            role: None,
        },
    )
    .await
    .expect("agent")
}

#[tokio::test]
async fn create_lead_trims_name_and_stamps_times() {
    let ctx = ApiContext::new();
    let lead = create_lead(&ctx, lead_draft("  Acme Corp  "))
        .await
        .expect("lead");
    assert_eq!(lead.name, "Acme Corp");
    assert_eq!(lead.updated_at, Some(lead.created_at));
    assert_eq!(list_leads(&ctx).await.expect("list").len(), 1);
}

#[tokio::test]
async fn blank_lead_name_is_a_validation_error() {
    let ctx = ApiContext::new();
    let err = create_lead(&ctx, lead_draft("   "))
        .await
        .expect_err("blank name");
    assert!(matches!(err.code, ErrorCode::Validation));
    assert!(list_leads(&ctx).await.expect("list").is_empty());
}

#[tokio::test]
async fn lead_with_unknown_agent_or_tag_is_rejected() {
    let ctx = ApiContext::new();
    let mut draft = lead_draft("Globex");
    draft.sales_agent = Some(AgentId::from("missing"));
    let err = create_lead(&ctx, draft).await.expect_err("agent");
    assert!(matches!(err.code, ErrorCode::Validation));

    let mut draft = lead_draft("Globex");
    draft.tags = vec![TagId::from("missing")];
    let err = create_lead(&ctx, draft).await.expect_err("tag");
    assert!(matches!(err.code, ErrorCode::Validation));
}

#[tokio::test]
async fn patch_can_unassign_and_leaves_other_fields() {
    let ctx = ApiContext::new();
    let priya = agent(&ctx, "Priya", "priya@example.com").await;
    let mut draft = lead_draft("Acme Corp");
    draft.sales_agent = Some(priya.id.clone());
    let lead = create_lead(&ctx, draft).await.expect("lead");

    let updated = update_lead(
        &ctx,
        &lead.id,
        LeadPatch {
            sales_agent: Some(None),
            ..LeadPatch::default()
        },
    )
    .await
    .expect("unassign");
    assert_eq!(updated.sales_agent, None);
    assert_eq!(updated.name, "Acme Corp");
    assert_eq!(updated.status, LeadStatus::New);

    let closed = update_lead(&ctx, &lead.id, LeadPatch::status(LeadStatus::Closed))
        .await
        .expect("close");
    assert_eq!(closed.status, LeadStatus::Closed);
}

#[tokio::test]
async fn missing_lead_is_not_found() {
    let ctx = ApiContext::new();
    let err = get_lead(&ctx, &LeadId::from("nope"))
        .await
        .expect_err("missing");
    assert!(matches!(err.code, ErrorCode::NotFound));
    let err = delete_lead(&ctx, &LeadId::from("nope"))
        .await
        .expect_err("missing");
    assert!(matches!(err.code, ErrorCode::NotFound));
}

#[tokio::test]
async fn duplicate_agent_email_conflicts() {
    let ctx = ApiContext::new();
    agent(&ctx, "Priya", "priya@example.com").await;
    let err = create_agent(
        &ctx,
        AgentDraft {
            name: "Other Priya".into(),
            email: "PRIYA@example.com".into(),
            role: None,
        },
    )
    .await
    .expect_err("duplicate");
    assert!(matches!(err.code, ErrorCode::Conflict));
}

#[tokio::test]
async fn malformed_email_is_rejected() {
    let ctx = ApiContext::new();
    let err = create_agent(
        &ctx,
        AgentDraft {
            name: "Priya".into(),
            email: "priya.example.com".into(),
            role: None,
        },
    )
    .await
    .expect_err("email");
    assert!(matches!(err.code, ErrorCode::Validation));
}

#[tokio::test]
async fn deleting_agent_unassigns_their_leads() {
    let ctx = ApiContext::new();
    let priya = agent(&ctx, "Priya", "priya@example.com").await;
    let mut draft = lead_draft("Acme Corp");
    draft.sales_agent = Some(priya.id.clone());
    let lead = create_lead(&ctx, draft).await.expect("lead");

    delete_agent(&ctx, &priya.id).await.expect("delete");
    let lead = get_lead(&ctx, &lead.id).await.expect("lead");
    assert_eq!(lead.sales_agent, None);
    assert!(list_agents(&ctx).await.expect("agents").is_empty());
}

#[tokio::test]
async fn deleting_tag_strips_it_from_leads() {
    let ctx = ApiContext::new();
    let hot = create_tag(&ctx, TagDraft { name: "Hot".into() })
        .await
        .expect("tag");
    let mut draft = lead_draft("Acme Corp");
    draft.tags = vec![hot.id.clone(), hot.id.clone()];
    let lead = create_lead(&ctx, draft).await.expect("lead");
    assert_eq!(lead.tags, vec![hot.id.clone()]);

    let err = create_tag(&ctx, TagDraft { name: "hot".into() })
        .await
        .expect_err("duplicate");
    assert!(matches!(err.code, ErrorCode::Conflict));

    delete_tag(&ctx, &hot.id).await.expect("delete");
    assert!(get_lead(&ctx, &lead.id).await.expect("lead").tags.is_empty());
}

#[tokio::test]
async fn comments_list_newest_first_and_die_with_their_lead() {
    let ctx = ApiContext::new();
    let priya = agent(&ctx, "Priya", "priya@example.com").await;
    let lead = create_lead(&ctx, lead_draft("Acme Corp"))
        .await
        .expect("lead");

    let first = add_comment(
        &ctx,
        &lead.id,
        CommentDraft {
            text: "first".into(),
            author: priya.id.clone(),
        },
    )
    .await
    .expect("comment");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = add_comment(
        &ctx,
        &lead.id,
        CommentDraft {
            text: "second".into(),
            author: priya.id.clone(),
        },
    )
    .await
    .expect("comment");

    let listed = list_comments(&ctx, &lead.id).await.expect("comments");
    assert_eq!(
        listed.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
        vec![second.id.clone(), first.id.clone()]
    );

    let edited = update_comment(
        &ctx,
        &lead.id,
        &first.id,
        CommentPatch {
            text: Some("edited".into()),
        },
    )
    .await
    .expect("edit");
    assert_eq!(edited.comment_text, "edited");

    delete_lead(&ctx, &lead.id).await.expect("delete");
    let err = list_comments(&ctx, &lead.id).await.expect_err("gone");
    assert!(matches!(err.code, ErrorCode::NotFound));
}

#[tokio::test]
async fn comment_author_must_exist() {
    let ctx = ApiContext::new();
    let lead = create_lead(&ctx, lead_draft("Acme Corp"))
        .await
        .expect("lead");
    let err = add_comment(
        &ctx,
        &lead.id,
        CommentDraft {
            text: "hello".into(),
            author: AgentId::from("ghost"),
        },
    )
    .await
    .expect_err("author");
    assert!(matches!(err.code, ErrorCode::Validation));
}

#[tokio::test]
async fn report_counts_every_bucket_and_orders_agents() {
    let ctx = ApiContext::new();
    let priya = agent(&ctx, "Priya", "priya@example.com").await;
    let marcus = agent(&ctx, "Marcus", "marcus@example.com").await;

    for (name, owner, status, days) in [
        ("A", Some(&marcus), LeadStatus::Closed, 10),
        ("B", Some(&marcus), LeadStatus::Closed, 20),
        ("C", Some(&marcus), LeadStatus::New, 5),
        ("D", Some(&priya), LeadStatus::Qualified, 5),
        ("E", None, LeadStatus::New, 5),
    ] {
        let mut draft = lead_draft(name);
        draft.sales_agent = owner.map(|agent| agent.id.clone());
        draft.status = status;
        draft.time_to_close = days;
        create_lead(&ctx, draft).await.expect("lead");
    }

    let aggregate = report(&ctx).await.expect("report");
    assert_eq!(aggregate.total_leads, 5);
    assert_eq!(aggregate.closed_leads, 2);
    assert_eq!(aggregate.active_leads, 3);
    assert!((aggregate.average_time_to_close - 15.0).abs() < f64::EPSILON);
    assert_eq!(aggregate.leads_by_status.len(), LeadStatus::ALL.len());
    assert_eq!(aggregate.status_count(LeadStatus::ProposalSent), 0);
    assert_eq!(aggregate.priority_count(LeadPriority::Medium), 5);

    assert_eq!(aggregate.leads_by_agent[0].agent_name, "Marcus");
    assert_eq!(aggregate.leads_by_agent[0].count, 3);
    assert_eq!(aggregate.leads_by_agent[0].closed_count, 2);
    assert_eq!(aggregate.leads_by_agent[1].agent_name, "Priya");

    assert_eq!(aggregate.recent_activity.len(), RECENT_ACTIVITY_LIMIT);
    assert!(aggregate
        .recent_activity
        .iter()
        .any(|entry| entry.agent == UNASSIGNED_AGENT));
}

#[tokio::test]
async fn empty_report_has_zero_average() {
    let aggregate = report(&ApiContext::new()).await.expect("report");
    assert_eq!(aggregate.total_leads, 0);
    assert_eq!(aggregate.average_time_to_close, 0.0);
    assert!(aggregate.recent_activity.is_empty());
    assert_eq!(aggregate.status_count(LeadStatus::New), 0);
}

#[tokio::test]
async fn demo_data_is_internally_consistent() {
    let ctx = ApiContext::with_demo_data();
    let agents = list_agents(&ctx).await.expect("agents");
    let tags = list_tags(&ctx).await.expect("tags");
    for lead in list_leads(&ctx).await.expect("leads") {
        if let Some(owner) = &lead.sales_agent {
            assert!(agents.iter().any(|agent| &agent.id == owner));
        }
        for tag in &lead.tags {
            assert!(tags.iter().any(|known| &known.id == tag));
        }
    }
}
