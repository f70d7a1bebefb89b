use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::saved::{FilterDomain, OwnerId, SavedFilterId, SavedFilterRecord};

/// Backend for the `saved_filters` store. There is no update; a replace is a delete followed by an insert.
#[async_trait]
pub trait SavedFilterStorage: Send + Sync {
    async fn insert(&self, record: SavedFilterRecord) -> Result<(), StorageError>;

    /// All rows for an owner and domain, in any order.
    async fn list(&self, owner: &OwnerId, domain: FilterDomain) -> Result<Vec<SavedFilterRecord>, StorageError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: SavedFilterId) -> Result<bool, StorageError>;
}

/// Sorts rows the way the saved filter list is shown: newest first, ties broken by id.
pub fn sort_by_recency(records: &mut [SavedFilterRecord]) { records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))); }

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// Process-local store, for tests and for sessions that do not persist.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<Vec<SavedFilterRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { lock(&self.records).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl SavedFilterStorage for MemoryStorage {
    async fn insert(&self, record: SavedFilterRecord) -> Result<(), StorageError> {
        let mut records = lock(&self.records);
        records.retain(|r| r.id != record.id);
        records.push(record);
        Ok(())
    }

    async fn list(&self, owner: &OwnerId, domain: FilterDomain) -> Result<Vec<SavedFilterRecord>, StorageError> {
        Ok(lock(&self.records).iter().filter(|r| &r.owner == owner && r.domain == domain).cloned().collect())
    }

    async fn delete(&self, id: SavedFilterId) -> Result<bool, StorageError> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}
