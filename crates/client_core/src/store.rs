use std::{
    collections::HashMap,
    hash::Hash,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use shared::domain::{Agent, AgentId, EntityKind, Lead, LeadId, Tag, TagId};

/// Ordered id-keyed collection. Order follows the service listing, new ids append.
#[doc(hidden)]
pub struct Collection<K, V> {
    order: Vec<K>,
    records: HashMap<K, V>,
}

impl<K, V> Default for Collection<K, V> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            records: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash, V: Clone> Collection<K, V> {
    fn all(&self) -> Vec<V> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    fn upsert(&mut self, id: K, record: V) {
        if self.records.insert(id.clone(), record).is_none() {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: &K) -> Option<V> {
        let removed = self.records.remove(id)?;
        self.order.retain(|known| known != id);
        Some(removed)
    }

    fn replace_all(&mut self, records: impl IntoIterator<Item = (K, V)>) {
        self.order.clear();
        self.records.clear();
        for (id, record) in records {
            self.upsert(id, record);
        }
    }
}

/// A record type mirrored by [`EntityStore`].
pub trait Mirrored: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Send + Sync;
    const KIND: EntityKind;

    fn id(&self) -> &Self::Id;

    #[doc(hidden)]
    fn collection(tables: &Tables) -> &Collection<Self::Id, Self>;

    #[doc(hidden)]
    fn collection_mut(tables: &mut Tables) -> &mut Collection<Self::Id, Self>;
}

#[doc(hidden)]
#[derive(Default)]
pub struct Tables {
    leads: Collection<LeadId, Lead>,
    agents: Collection<AgentId, Agent>,
    tags: Collection<TagId, Tag>,
}

impl Mirrored for Lead {
    type Id = LeadId;
    const KIND: EntityKind = EntityKind::Lead;

    fn id(&self) -> &LeadId {
        &self.id
    }

    fn collection(tables: &Tables) -> &Collection<LeadId, Lead> {
        &tables.leads
    }

    fn collection_mut(tables: &mut Tables) -> &mut Collection<LeadId, Lead> {
        &mut tables.leads
    }
}

impl Mirrored for Agent {
    type Id = AgentId;
    const KIND: EntityKind = EntityKind::Agent;

    fn id(&self) -> &AgentId {
        &self.id
    }

    fn collection(tables: &Tables) -> &Collection<AgentId, Agent> {
        &tables.agents
    }

    fn collection_mut(tables: &mut Tables) -> &mut Collection<AgentId, Agent> {
        &mut tables.agents
    }
}

impl Mirrored for Tag {
    type Id = TagId;
    const KIND: EntityKind = EntityKind::Tag;

    fn id(&self) -> &TagId {
        &self.id
    }

    fn collection(tables: &Tables) -> &Collection<TagId, Tag> {
        &tables.tags
    }

    fn collection_mut(tables: &mut Tables) -> &mut Collection<TagId, Tag> {
        &mut tables.tags
    }
}

/// Local mirror of the service's leads, agents and tags.
///
/// Reads are open to everyone; only the mutation coordinator writes. Locks are
/// never held across an `.await`, so a read issued after a write returns sees it.
#[derive(Default)]
pub struct EntityStore {
    tables: RwLock<Tables>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all<T: Mirrored>(&self) -> Vec<T> {
        T::collection(&self.read()).all()
    }

    pub fn get<T: Mirrored>(&self, id: &T::Id) -> Option<T> {
        T::collection(&self.read()).records.get(id).cloned()
    }

    pub fn contains<T: Mirrored>(&self, id: &T::Id) -> bool {
        T::collection(&self.read()).records.contains_key(id)
    }

    pub fn len<T: Mirrored>(&self) -> usize {
        T::collection(&self.read()).records.len()
    }

    pub fn is_empty(&self) -> bool {
        let tables = self.read();
        tables.leads.records.is_empty()
            && tables.agents.records.is_empty()
            && tables.tags.records.is_empty()
    }

    pub(crate) fn upsert<T: Mirrored>(&self, record: T) {
        let id = record.id().clone();
        T::collection_mut(&mut self.write()).upsert(id, record);
    }

    pub(crate) fn remove<T: Mirrored>(&self, id: &T::Id) -> Option<T> {
        T::collection_mut(&mut self.write()).remove(id)
    }

    pub(crate) fn replace_all<T: Mirrored>(&self, records: Vec<T>) {
        T::collection_mut(&mut self.write())
            .replace_all(records.into_iter().map(|record| (record.id().clone(), record)));
    }

    /// Clears the agent reference on every mirrored lead that pointed at `agent_id`.
    pub(crate) fn detach_agent(&self, agent_id: &AgentId) -> usize {
        let mut tables = self.write();
        let mut detached = 0;
        for lead in tables.leads.records.values_mut() {
            if lead.sales_agent.as_ref() == Some(agent_id) {
                lead.sales_agent = None;
                detached += 1;
            }
        }
        detached
    }

    pub(crate) fn detach_tag(&self, tag_id: &TagId) -> usize {
        let mut tables = self.write();
        let mut detached = 0;
        for lead in tables.leads.records.values_mut() {
            let before = lead.tags.len();
            lead.tags.retain(|tag| tag != tag_id);
            detached += before - lead.tags.len();
        }
        detached
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
