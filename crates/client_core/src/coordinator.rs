use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use shared::{
    domain::{Agent, AgentId, Comment, CommentId, EntityKind, Lead, LeadId, Tag, TagId},
    protocol::{
        AgentDraft, AgentPatch, CommentDraft, CommentPatch, LeadDraft, LeadPatch, TagDraft,
        TagPatch,
    },
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::SyncError, gateway::RemoteGateway, report_cache::ReportAggregateCache,
    store::EntityStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        })
    }
}

/// Emitted after the service confirmed a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: EntityKind,
    pub id: String,
    pub change: ChangeKind,
}

/// Receives the user-facing outcome of every write.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn failure(&self, message: &str);
}

/// Default notifier: outcomes only go to the log.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!(%message, "notify: success");
    }

    fn failure(&self, message: &str) {
        warn!(%message, "notify: failure");
    }
}

/// Per-entity write ordering. Every write draws a ticket before its request
/// goes out; a response is applied only if no newer ticket for the same
/// entity has been applied already.
#[derive(Default)]
struct WriteTickets {
    issued: AtomicU64,
    applied: Mutex<HashMap<(EntityKind, String), u64>>,
}

impl WriteTickets {
    fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn apply_if_newer(
        &self,
        kind: EntityKind,
        id: &str,
        ticket: u64,
        apply: impl FnOnce(),
    ) -> bool {
        let mut applied = self
            .applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (kind, id.to_string());
        if applied.get(&key).is_some_and(|last| *last > ticket) {
            return false;
        }
        applied.insert(key, ticket);
        apply();
        true
    }
}

/// Runs every write: validate, call the service, mirror the confirmed result,
/// announce the change and report the outcome.
pub struct MutationCoordinator {
    store: Arc<EntityStore>,
    gateway: RemoteGateway,
    events: broadcast::Sender<ChangeEvent>,
    notifier: Arc<dyn Notifier>,
    reports: Option<Arc<ReportAggregateCache>>,
    tickets: WriteTickets,
}

impl MutationCoordinator {
    pub fn new(
        store: Arc<EntityStore>,
        gateway: RemoteGateway,
        events: broadcast::Sender<ChangeEvent>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            notifier,
            reports: None,
            tickets: WriteTickets::default(),
        }
    }

    /// Confirmed writes mark this cache stale before their change event goes out.
    pub fn with_report_cache(mut self, reports: Arc<ReportAggregateCache>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    pub async fn create_lead(
        &self,
        draft: LeadDraft,
        cancel: &CancellationToken,
    ) -> Result<Lead, SyncError> {
        if let Err(err) = self.check_lead_fields(
            Some(draft.name.as_str()),
            draft.sales_agent.as_ref(),
            Some(&draft.tags),
        ) {
            return self.rejected(err);
        }
        let ticket = self.tickets.issue();
        let outcome = self.gateway.create_lead(&draft, cancel).await;
        self.settle(
            EntityKind::Lead,
            ChangeKind::Created,
            ticket,
            cancel,
            outcome,
            |lead| lead.id.to_string(),
            |store, lead| store.upsert(lead.clone()),
        )
    }

    pub async fn update_lead(
        &self,
        id: &LeadId,
        patch: LeadPatch,
        cancel: &CancellationToken,
    ) -> Result<Lead, SyncError> {
        let agent = patch.sales_agent.as_ref().and_then(Option::as_ref);
        if let Err(err) =
            self.check_lead_fields(patch.name.as_deref(), agent, patch.tags.as_ref())
        {
            return self.rejected(err);
        }
        let ticket = self.tickets.issue();
        let outcome = self.gateway.update_lead(id, &patch, cancel).await;
        self.settle(
            EntityKind::Lead,
            ChangeKind::Updated,
            ticket,
            cancel,
            outcome,
            |lead| lead.id.to_string(),
            |store, lead| store.upsert(lead.clone()),
        )
    }

    pub async fn delete_lead(
        &self,
        id: &LeadId,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let ticket = self.tickets.issue();
        let outcome = self.gateway.delete_lead(id, cancel).await;
        self.settle(
            EntityKind::Lead,
            ChangeKind::Deleted,
            ticket,
            cancel,
            outcome,
            |_| id.to_string(),
            |store, _| {
                store.remove::<Lead>(id);
            },
        )
    }

    pub async fn create_agent(
        &self,
        draft: AgentDraft,
        cancel: &CancellationToken,
    ) -> Result<Agent, SyncError> {
        if let Err(err) = self.check_agent_fields(
            Some(draft.name.as_str()),
            Some(draft.email.as_str()),
            None,
        ) {
            return self.rejected(err);
        }
        let ticket = self.tickets.issue();
        let outcome = self.gateway.create_agent(&draft, cancel).await;
        self.settle(
            EntityKind::Agent,
            ChangeKind::Created,
            ticket,
            cancel,
            outcome,
            |agent| agent.id.to_string(),
            |store, agent| store.upsert(agent.clone()),
        )
    }

    pub async fn update_agent(
        &self,
        id: &AgentId,
        patch: AgentPatch,
        cancel: &CancellationToken,
    ) -> Result<Agent, SyncError> {
        if let Err(err) =
            self.check_agent_fields(patch.name.as_deref(), patch.email.as_deref(), Some(id))
        {
            return self.rejected(err);
        }
        let ticket = self.tickets.issue();
        let outcome = self.gateway.update_agent(id, &patch, cancel).await;
        self.settle(
            EntityKind::Agent,
            ChangeKind::Updated,
            ticket,
            cancel,
            outcome,
            |agent| agent.id.to_string(),
            |store, agent| store.upsert(agent.clone()),
        )
    }

    /// Deletes an agent; mirrored leads it owned become unassigned.
    pub async fn delete_agent(
        &self,
        id: &AgentId,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let ticket = self.tickets.issue();
        let outcome = self.gateway.delete_agent(id, cancel).await;
        self.settle(
            EntityKind::Agent,
            ChangeKind::Deleted,
            ticket,
            cancel,
            outcome,
            |_| id.to_string(),
            |store, _| {
                store.remove::<Agent>(id);
                let detached = store.detach_agent(id);
                debug!(agent_id = %id, detached, "coordinator: leads unassigned");
            },
        )
    }

    pub async fn create_tag(
        &self,
        draft: TagDraft,
        cancel: &CancellationToken,
    ) -> Result<Tag, SyncError> {
        if let Err(err) = self.check_tag_name(&draft.name, None) {
            return self.rejected(err);
        }
        let ticket = self.tickets.issue();
        let outcome = self.gateway.create_tag(&draft, cancel).await;
        self.settle(
            EntityKind::Tag,
            ChangeKind::Created,
            ticket,
            cancel,
            outcome,
            |tag| tag.id.to_string(),
            |store, tag| store.upsert(tag.clone()),
        )
    }

    pub async fn update_tag(
        &self,
        id: &TagId,
        patch: TagPatch,
        cancel: &CancellationToken,
    ) -> Result<Tag, SyncError> {
        if let Some(name) = &patch.name {
            if let Err(err) = self.check_tag_name(name, Some(id)) {
                return self.rejected(err);
            }
        }
        let ticket = self.tickets.issue();
        let outcome = self.gateway.update_tag(id, &patch, cancel).await;
        self.settle(
            EntityKind::Tag,
            ChangeKind::Updated,
            ticket,
            cancel,
            outcome,
            |tag| tag.id.to_string(),
            |store, tag| store.upsert(tag.clone()),
        )
    }

    pub async fn delete_tag(&self, id: &TagId, cancel: &CancellationToken) -> Result<(), SyncError> {
        let ticket = self.tickets.issue();
        let outcome = self.gateway.delete_tag(id, cancel).await;
        self.settle(
            EntityKind::Tag,
            ChangeKind::Deleted,
            ticket,
            cancel,
            outcome,
            |_| id.to_string(),
            |store, _| {
                store.remove::<Tag>(id);
                store.detach_tag(id);
            },
        )
    }

    /// Comments are not mirrored; the write still announces a change.
    pub async fn add_comment(
        &self,
        lead_id: &LeadId,
        draft: CommentDraft,
        cancel: &CancellationToken,
    ) -> Result<Comment, SyncError> {
        if let Err(err) = self.check_comment(&draft.text, Some(&draft.author)) {
            return self.rejected(err);
        }
        let ticket = self.tickets.issue();
        let outcome = self.gateway.add_comment(lead_id, &draft, cancel).await;
        self.settle(
            EntityKind::Comment,
            ChangeKind::Created,
            ticket,
            cancel,
            outcome,
            |comment| comment.id.to_string(),
            |_, _| {},
        )
    }

    pub async fn update_comment(
        &self,
        lead_id: &LeadId,
        comment_id: &CommentId,
        patch: CommentPatch,
        cancel: &CancellationToken,
    ) -> Result<Comment, SyncError> {
        if let Some(text) = &patch.text {
            if let Err(err) = self.check_comment(text, None) {
                return self.rejected(err);
            }
        }
        let ticket = self.tickets.issue();
        let outcome = self
            .gateway
            .update_comment(lead_id, comment_id, &patch, cancel)
            .await;
        self.settle(
            EntityKind::Comment,
            ChangeKind::Updated,
            ticket,
            cancel,
            outcome,
            |comment| comment.id.to_string(),
            |_, _| {},
        )
    }

    pub async fn delete_comment(
        &self,
        lead_id: &LeadId,
        comment_id: &CommentId,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let ticket = self.tickets.issue();
        let outcome = self
            .gateway
            .delete_comment(lead_id, comment_id, cancel)
            .await;
        self.settle(
            EntityKind::Comment,
            ChangeKind::Deleted,
            ticket,
            cancel,
            outcome,
            |_| comment_id.to_string(),
            |_, _| {},
        )
    }

    /// Hydrates leads, agents and tags concurrently. Nothing is replaced unless all three load.
    pub async fn sync_all(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let (leads, agents, tags) = futures::try_join!(
            self.gateway.list_leads(cancel),
            self.gateway.list_agents(cancel),
            self.gateway.list_tags(cancel),
        )?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        info!(
            leads = leads.len(),
            agents = agents.len(),
            tags = tags.len(),
            "coordinator: store hydrated"
        );
        self.store.replace_all(agents);
        self.store.replace_all(tags);
        self.store.replace_all(leads);
        Ok(())
    }

    /// Refreshes one lead. A lead the service no longer knows is dropped from the store.
    pub async fn sync_lead(
        &self,
        id: &LeadId,
        cancel: &CancellationToken,
    ) -> Result<Lead, SyncError> {
        let ticket = self.tickets.issue();
        let outcome = self.gateway.get_lead(id, cancel).await;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        match outcome {
            Ok(lead) => {
                self.tickets
                    .apply_if_newer(EntityKind::Lead, id.as_str(), ticket, || {
                        self.store.upsert(lead.clone())
                    });
                Ok(lead)
            }
            Err(err) if err.is_not_found() => {
                self.tickets
                    .apply_if_newer(EntityKind::Lead, id.as_str(), ticket, || {
                        self.store.remove::<Lead>(id);
                    });
                info!(lead_id = %id, "coordinator: lead vanished remotely");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn settle<T>(
        &self,
        kind: EntityKind,
        change: ChangeKind,
        ticket: u64,
        cancel: &CancellationToken,
        outcome: Result<T, SyncError>,
        id_of: impl FnOnce(&T) -> String,
        apply: impl FnOnce(&EntityStore, &T),
    ) -> Result<T, SyncError> {
        let value = match outcome {
            Ok(value) => value,
            Err(SyncError::Cancelled) => {
                debug!(%kind, %change, "coordinator: write abandoned");
                return Err(SyncError::Cancelled);
            }
            Err(err) => {
                warn!(%kind, %change, error = %err, "coordinator: write failed");
                self.notifier.failure(&err.to_string());
                return Err(err);
            }
        };
        let id = id_of(&value);

        if cancel.is_cancelled() {
            info!(%kind, %id, %change, "coordinator: confirmed after cancellation, store untouched");
            self.emit(kind, id, change);
            return Err(SyncError::Cancelled);
        }

        let applied = self
            .tickets
            .apply_if_newer(kind, &id, ticket, || apply(self.store.as_ref(), &value));
        if !applied {
            debug!(%kind, %id, ticket, "coordinator: superseded response not mirrored");
        }
        info!(%kind, %id, %change, "coordinator: write confirmed");
        self.notifier.success(&format!("{kind} {change}"));
        self.emit(kind, id, change);
        Ok(value)
    }

    fn rejected<T>(&self, err: SyncError) -> Result<T, SyncError> {
        warn!(error = %err, "coordinator: write rejected locally");
        self.notifier.failure(&err.to_string());
        Err(err)
    }

    fn emit(&self, kind: EntityKind, id: String, change: ChangeKind) {
        if let Some(reports) = &self.reports {
            reports.invalidate();
        }
        // Err only means nobody is subscribed.
        let _ = self.events.send(ChangeEvent { kind, id, change });
    }

    fn check_lead_fields(
        &self,
        name: Option<&str>,
        agent: Option<&AgentId>,
        tags: Option<&Vec<TagId>>,
    ) -> Result<(), SyncError> {
        if name.is_some_and(|name| name.trim().is_empty()) {
            return Err(SyncError::validation("name", "lead name is required"));
        }
        if let Some(agent) = agent {
            if !self.store.contains::<Agent>(agent) {
                return Err(SyncError::validation(
                    "salesAgent",
                    format!("unknown sales agent '{agent}'"),
                ));
            }
        }
        if let Some(missing) = tags
            .into_iter()
            .flatten()
            .find(|tag| !self.store.contains::<Tag>(tag))
        {
            return Err(SyncError::validation("tags", format!("unknown tag '{missing}'")));
        }
        Ok(())
    }

    fn check_agent_fields(
        &self,
        name: Option<&str>,
        email: Option<&str>,
        except: Option<&AgentId>,
    ) -> Result<(), SyncError> {
        if name.is_some_and(|name| name.trim().is_empty()) {
            return Err(SyncError::validation("name", "agent name is required"));
        }
        if let Some(email) = email {
            let email = email.trim();
            if !email.contains('@') {
                return Err(SyncError::validation(
                    "email",
                    format!("'{email}' is not a valid email"),
                ));
            }
            let taken = self
                .store
                .all::<Agent>()
                .iter()
                .any(|agent| Some(&agent.id) != except && agent.email.eq_ignore_ascii_case(email));
            if taken {
                return Err(SyncError::validation(
                    "email",
                    format!("an agent with email '{email}' already exists"),
                ));
            }
        }
        Ok(())
    }

    fn check_tag_name(&self, name: &str, except: Option<&TagId>) -> Result<(), SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::validation("name", "tag name is required"));
        }
        let taken = self
            .store
            .all::<Tag>()
            .iter()
            .any(|tag| Some(&tag.id) != except && tag.name.eq_ignore_ascii_case(name));
        if taken {
            return Err(SyncError::validation(
                "name",
                format!("tag '{name}' already exists"),
            ));
        }
        Ok(())
    }

    fn check_comment(&self, text: &str, author: Option<&AgentId>) -> Result<(), SyncError> {
        if text.trim().is_empty() {
            return Err(SyncError::validation("text", "comment text is required"));
        }
        if let Some(author) = author {
            if !self.store.contains::<Agent>(author) {
                return Err(SyncError::validation(
                    "author",
                    format!("unknown author '{author}'"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
