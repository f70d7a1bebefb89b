use std::path::PathBuf;

use async_trait::async_trait;
use chrono::DateTime;
use filtra_core::{FilterDomain, OwnerId, SavedFilterId, SavedFilterRecord, SavedFilterStorage, StorageError};
use serde::{Deserialize, Serialize};
use sled::{Config, Db, Tree};
use tokio::task;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SledError;

/// On-disk form of a saved filter, bincode encoded and keyed by the id's uuid bytes.
#[derive(Serialize, Deserialize)]
struct StoredFilter {
    name: String,
    filter_data: String,
    owner: String,
    domain: String,
    created_at_micros: i64,
}

impl StoredFilter {
    fn from_record(record: &SavedFilterRecord) -> Self {
        Self {
            name: record.name.clone(),
            filter_data: record.filter_data.clone(),
            owner: record.owner.as_str().to_string(),
            domain: record.domain.as_str().to_string(),
            created_at_micros: record.created_at.timestamp_micros(),
        }
    }

    /// `None` when the stored domain or timestamp no longer makes sense.
    fn into_record(self, id: SavedFilterId) -> Option<SavedFilterRecord> {
        Some(SavedFilterRecord {
            id,
            name: self.name,
            filter_data: self.filter_data,
            owner: OwnerId::new(self.owner),
            domain: self.domain.parse().ok()?,
            created_at: DateTime::from_timestamp_micros(self.created_at_micros)?,
        })
    }
}

/// Cheap to clone; clones share the same database.
#[derive(Clone)]
pub struct SledFilterStore {
    db: Db,
    filters: Tree,
}

impl SledFilterStore {
    pub fn open(db: Db) -> anyhow::Result<Self> {
        let filters = db.open_tree("saved_filters")?;
        Ok(Self { db, filters })
    }

    pub fn with_homedir_folder(folder_name: &str) -> anyhow::Result<Self> {
        let dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?.join(folder_name);
        Self::with_path(dir)
    }

    pub fn with_path(path: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&path)?;
        Self::open(sled::open(path.join("sled"))?)
    }

    pub fn new() -> anyhow::Result<Self> { Self::with_homedir_folder(".filtra") }

    /// Temporary database, removed when the store is dropped.
    pub fn new_test() -> anyhow::Result<Self> { Self::open(Config::new().temporary(true).flush_every_ms(None).open()?) }

    pub fn db(&self) -> &Db { &self.db }

    fn insert_blocking(&self, record: SavedFilterRecord) -> Result<(), SledError> {
        let bytes = bincode::serialize(&StoredFilter::from_record(&record))?;
        self.filters.insert(record.id.as_uuid().as_bytes(), bytes)?;
        self.filters.flush()?;
        Ok(())
    }

    fn list_blocking(&self, owner: &OwnerId, domain: FilterDomain) -> Result<Vec<SavedFilterRecord>, SledError> {
        let mut records = Vec::new();
        for item in self.filters.iter() {
            let (key, value) = item?;
            let Ok(id) = Uuid::from_slice(&key).map(SavedFilterId::from) else {
                warn!("skipping saved filter with a malformed key");
                continue;
            };
            let stored: StoredFilter = match bincode::deserialize(&value) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("skipping saved filter {id}: {e}");
                    continue;
                }
            };
            if stored.owner != owner.as_str() || stored.domain != domain.as_str() {
                continue;
            }
            match stored.into_record(id) {
                Some(record) => records.push(record),
                None => warn!("skipping malformed saved filter {id}"),
            }
        }
        Ok(records)
    }

    fn delete_blocking(&self, id: SavedFilterId) -> Result<bool, SledError> {
        let removed = self.filters.remove(id.as_uuid().as_bytes())?.is_some();
        self.filters.flush()?;
        Ok(removed)
    }
}

#[async_trait]
impl SavedFilterStorage for SledFilterStore {
    async fn insert(&self, record: SavedFilterRecord) -> Result<(), StorageError> {
        debug!("SledFilterStore.insert {}", record.id);
        let me = self.clone();
        Ok(task::spawn_blocking(move || me.insert_blocking(record)).await.map_err(SledError::from)??)
    }

    async fn list(&self, owner: &OwnerId, domain: FilterDomain) -> Result<Vec<SavedFilterRecord>, StorageError> {
        let me = self.clone();
        let owner = owner.clone();
        Ok(task::spawn_blocking(move || me.list_blocking(&owner, domain)).await.map_err(SledError::from)??)
    }

    async fn delete(&self, id: SavedFilterId) -> Result<bool, StorageError> {
        let me = self.clone();
        Ok(task::spawn_blocking(move || me.delete_blocking(id)).await.map_err(SledError::from)??)
    }
}
