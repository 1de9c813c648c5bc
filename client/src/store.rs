//! Reactive record stores.
//!
//! A [`RecordStore`] owns the in-memory cache for one collection: an
//! ordered record list unique by id, plus the set of live topics currently
//! subscribed. Every network operation delegates to the collection client
//! and reconciles the cache with the result; live events do the same. The
//! cache is a superset of what the UI has recently seen, never
//! authoritative beyond that.

use crate::backend::{EventAction, ListPage, ListQuery, Topic};
use crate::collection::{CollectionClient, RecordChange, RemoveOptions};
use crate::error::Result;
use crate::observe::{Observer, ObserverId, Observers, StoreEvent};
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tether_codec::{Model, RecordId};

struct StoreState<M: Model> {
    records: RwLock<Vec<M>>,
    topics: RwLock<BTreeSet<Topic>>,
    observers: Observers<M>,
}

impl<M: Model> StoreState<M> {
    fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            topics: RwLock::new(BTreeSet::new()),
            observers: Observers::new(),
        }
    }

    /// Replace the record with the same id, or append.
    ///
    /// Last write wins by arrival order; there is no version
    /// reconciliation, so a stale response landing after a newer live event
    /// overwrites it.
    fn upsert(&self, record: M) {
        {
            let mut records = write(&self.records);
            match records.iter().position(|r| r.id() == record.id()) {
                Some(index) => records[index] = record.clone(),
                None => records.push(record.clone()),
            }
        }
        self.observers.emit(&StoreEvent::Upserted(record));
    }

    /// Remove the record with the given id, if cached.
    fn remove(&self, id: &RecordId) {
        let removed = {
            let mut records = write(&self.records);
            match records.iter().position(|r| r.id() == id) {
                Some(index) => {
                    records.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.observers.emit(&StoreEvent::Removed(id.clone()));
        }
    }
}

/// In-memory cache plus subscription bookkeeping for one collection.
pub struct RecordStore<M: Model> {
    client: CollectionClient<M>,
    state: Arc<StoreState<M>>,
}

impl<M: Model> Clone for RecordStore<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<M: Model> RecordStore<M> {
    pub fn new(client: impl Into<CollectionClient<M>>) -> Self {
        Self {
            client: client.into(),
            state: Arc::new(StoreState::new()),
        }
    }

    /// The collection client this store delegates to.
    pub fn client(&self) -> &CollectionClient<M> {
        &self.client
    }

    /// Snapshot of the cached records, in cache order.
    pub fn records(&self) -> Vec<M> {
        read(&self.state.records).clone()
    }

    /// The cached record with the given id, if any.
    pub fn get(&self, id: &RecordId) -> Option<M> {
        read(&self.state.records)
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        read(&self.state.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the currently subscribed topics.
    pub fn subscribed_topics(&self) -> BTreeSet<Topic> {
        read(&self.state.topics).clone()
    }

    /// Register an observer for cache mutations. Observers are notified
    /// synchronously, before the mutating call returns.
    pub fn observe(&self, observer: Observer<M>) -> ObserverId {
        self.state.observers.observe(observer)
    }

    /// Remove a previously registered observer.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.state.observers.unobserve(id)
    }

    /// Insert or replace a record in the cache.
    pub fn upsert(&self, record: M) {
        self.state.upsert(record);
    }

    /// Remove a record from the cache; a miss is a no-op.
    pub fn remove(&self, id: &RecordId) {
        self.state.remove(id);
    }

    /// Fetch every matching record and absorb it into the cache.
    pub async fn get_all(&self, query: &ListQuery) -> Result<Vec<M>> {
        let records = self.client.base().get_all(query).await?;
        for record in &records {
            self.upsert(record.clone());
        }
        Ok(records)
    }

    /// Fetch one page and absorb it into the cache.
    pub async fn get_many(
        &self,
        page: u32,
        per_page: u32,
        query: &ListQuery,
    ) -> Result<ListPage<M>> {
        let result = self.client.base().get_many(page, per_page, query).await?;
        for record in &result.items {
            self.upsert(record.clone());
        }
        Ok(result)
    }

    /// Fetch the first matching record, absorbing it when found.
    pub async fn get_first(&self, filter: &str) -> Result<Option<M>> {
        let record = self.client.base().get_first(filter).await?;
        if let Some(record) = &record {
            self.upsert(record.clone());
        }
        Ok(record)
    }

    /// Fetch a record by id and absorb it into the cache.
    pub async fn get_by_id(&self, id: &RecordId) -> Result<M> {
        let record = self.client.base().get_by_id(id).await?;
        self.upsert(record.clone());
        Ok(record)
    }

    /// Create a record and absorb the result.
    pub async fn add(&self, fields: &M::Fields) -> Result<M> {
        let record = self.client.base().add(fields).await?;
        self.upsert(record.clone());
        Ok(record)
    }

    /// Update a record and absorb the result.
    pub async fn update(
        &self,
        id: &RecordId,
        new_fields: &M::Fields,
        old_fields: Option<&M::Fields>,
    ) -> Result<M> {
        let record = self.client.base().update(id, new_fields, old_fields).await?;
        self.upsert(record.clone());
        Ok(record)
    }

    /// Remove a record and reconcile the cache: a surviving record (soft
    /// delete) is upserted, a hard delete evicts.
    pub async fn remove_by_id(&self, id: &RecordId, options: RemoveOptions) -> Result<Option<M>> {
        let record = self.client.base().remove_by_id(id, options).await?;
        match &record {
            Some(record) => self.upsert(record.clone()),
            None => self.remove(id),
        }
        Ok(record)
    }

    /// Subscribe the cache to a live topic. A topic already subscribed is a
    /// no-op, so exactly one listener exists per topic.
    pub async fn subscribe(&self, topic: Topic) -> Result<()> {
        if read(&self.state.topics).contains(&topic) {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        self.client
            .base()
            .subscribe(topic.clone(), move |change: RecordChange<M>| {
                match change.action {
                    EventAction::Create | EventAction::Update => state.upsert(change.record),
                    EventAction::Delete => state.remove(change.record.id()),
                }
            })
            .await?;

        write(&self.state.topics).insert(topic);
        Ok(())
    }

    /// Unsubscribe from a live topic; not being subscribed is a no-op.
    pub async fn unsubscribe(&self, topic: Topic) -> Result<()> {
        if !read(&self.state.topics).contains(&topic) {
            return Ok(());
        }
        self.client.base().unsubscribe(topic.clone()).await?;
        write(&self.state.topics).remove(&topic);
        Ok(())
    }

    /// Forget every subscribed topic without deregistering listeners.
    /// Used after the backend has already dropped all live channels.
    pub(crate) fn clear_topics(&self) {
        write(&self.state.topics).clear();
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
