use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use filterql::{FilterGroup, DEFAULT_MAX_DEPTH};
use tracing::{debug, info, warn};

use crate::error::{ServiceError, SessionError, ValidationError};
use crate::saved::{FilterDomain, OwnerId, SavedFilter, SavedFilterId};
use crate::session::UnifiedFilterSession;
use crate::storage::{sort_by_recency, SavedFilterStorage};

/// Saves, lists and deletes named filter trees. Calls go straight to the backend; nothing is retried.
#[derive(Clone)]
pub struct FilterPersistenceService {
    storage: Arc<dyn SavedFilterStorage>,
    max_depth: usize,
}

impl std::fmt::Debug for FilterPersistenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterPersistenceService").field("max_depth", &self.max_depth).finish_non_exhaustive()
    }
}

impl FilterPersistenceService {
    pub fn new(storage: Arc<dyn SavedFilterStorage>) -> Self { Self { storage, max_depth: DEFAULT_MAX_DEPTH } }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Checks that need no backend call.
    fn validate<'n>(&self, name: &'n str, filter: &FilterGroup) -> Result<&'n str, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::BlankName);
        }
        if filter.exceeds_depth(self.max_depth) {
            return Err(ValidationError::DepthExceeded { max: self.max_depth });
        }
        if filter.rule_count() == 0 {
            return Err(ValidationError::EmptyFilter);
        }
        Ok(name)
    }

    async fn ensure_unique(&self, name: &str, owner: &OwnerId, domain: FilterDomain, except: Option<SavedFilterId>) -> Result<(), ServiceError> {
        let existing = self.storage.list(owner, domain).await?;
        let lowered = name.to_lowercase();
        if existing.iter().any(|r| Some(r.id) != except && r.name.trim().to_lowercase() == lowered) {
            return Err(ValidationError::DuplicateName(name.to_string()).into());
        }
        Ok(())
    }

    pub async fn save(&self, name: &str, filter: &FilterGroup, owner: &OwnerId, domain: FilterDomain) -> Result<SavedFilter, ServiceError> {
        let name = self.validate(name, filter)?;
        self.ensure_unique(name, owner, domain, None).await?;
        self.insert(name, filter, owner, domain).await
    }

    /// Deletes `id` and saves the tree as a new filter. The new filter gets a fresh id.
    pub async fn replace(
        &self,
        id: SavedFilterId,
        name: &str,
        filter: &FilterGroup,
        owner: &OwnerId,
        domain: FilterDomain,
    ) -> Result<SavedFilter, ServiceError> {
        let name = self.validate(name, filter)?;
        self.ensure_unique(name, owner, domain, Some(id)).await?;
        if !self.storage.delete(id).await? {
            debug!("replacing saved filter {id} which no longer exists");
        }
        self.insert(name, filter, owner, domain).await
    }

    async fn insert(&self, name: &str, filter: &FilterGroup, owner: &OwnerId, domain: FilterDomain) -> Result<SavedFilter, ServiceError> {
        let saved = SavedFilter {
            id: SavedFilterId::new(),
            name: name.to_string(),
            filter: filter.clone(),
            owner: owner.clone(),
            domain,
            // microseconds survive every backend
            created_at: Utc::now().trunc_subsecs(6),
        };
        self.storage.insert(saved.to_record()?).await?;
        info!("saved filter {} ({:?}) for {owner}/{domain}", saved.id, saved.name);
        Ok(saved)
    }

    /// Newest first. Rows whose filter data no longer decodes are left out.
    pub async fn list(&self, owner: &OwnerId, domain: FilterDomain) -> Result<Vec<SavedFilter>, ServiceError> {
        let mut records = self.storage.list(owner, domain).await?;
        sort_by_recency(&mut records);
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let id = record.id;
                SavedFilter::try_from(record).map_err(|e| warn!("skipping saved filter {id}: {e}")).ok()
            })
            .collect())
    }

    /// Deleting an id that does not exist is not an error; it returns `Ok(false)`.
    pub async fn delete(&self, id: SavedFilterId) -> Result<bool, ServiceError> {
        let removed = self.storage.delete(id).await?;
        if !removed {
            debug!("saved filter {id} was already gone");
        }
        Ok(removed)
    }

    /// Makes the saved tree the session's advanced filter. No backend call.
    pub fn apply(&self, saved: &SavedFilter, session: &UnifiedFilterSession) -> Result<(), SessionError> {
        session.set_advanced_filter(saved.filter.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use filterql::{Condition, FilterNode, FilterRule, Operator};

    use super::*;
    use crate::error::StorageError;
    use crate::saved::SavedFilterRecord;
    use crate::storage::MemoryStorage;

    /// Counts every backend call; optionally fails them all.
    #[derive(Default)]
    struct Recording {
        inner: MemoryStorage,
        calls: AtomicUsize,
        fail: bool,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("backend offline")]
    struct Offline;

    impl Recording {
        fn failing() -> Self { Self { fail: true, ..Default::default() } }

        fn hit(&self) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StorageError::backend(Offline));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SavedFilterStorage for Recording {
        async fn insert(&self, record: SavedFilterRecord) -> Result<(), StorageError> {
            self.hit()?;
            self.inner.insert(record).await
        }

        async fn list(&self, owner: &OwnerId, domain: FilterDomain) -> Result<Vec<SavedFilterRecord>, StorageError> {
            self.hit()?;
            self.inner.list(owner, domain).await
        }

        async fn delete(&self, id: SavedFilterId) -> Result<bool, StorageError> {
            self.hit()?;
            self.inner.delete(id).await
        }
    }

    fn tree() -> FilterGroup {
        FilterGroup {
            id: "group-1".into(),
            condition: Condition::And,
            rules: vec![FilterNode::Rule(FilterRule {
                id: "rule-1".into(),
                field: "status".into(),
                operator: Operator::Equals,
                value: Some("Active".into()),
                field_name: None,
            })],
        }
    }

    #[tokio::test]
    async fn blank_name_never_reaches_the_backend() {
        let storage = Arc::new(Recording::default());
        let service = FilterPersistenceService::new(storage.clone());
        let owner = OwnerId::from("u1");

        let err = service.save("   ", &tree(), &owner, FilterDomain::Clients).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::BlankName)));
        assert!(!err.is_retryable());

        let empty = FilterGroup::new("g", Condition::And);
        let err = service.save("Ativos", &empty, &owner, FilterDomain::Clients).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::EmptyFilter)));

        assert_eq!(storage.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn save_list_delete() {
        let service = FilterPersistenceService::new(Arc::new(MemoryStorage::new()));
        let owner = OwnerId::from("u1");

        let first = service.save("  Ativos ", &tree(), &owner, FilterDomain::Clients).await.unwrap();
        assert_eq!(first.name, "Ativos");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = service.save("Outros", &tree(), &owner, FilterDomain::Clients).await.unwrap();

        let listed = service.list(&owner, FilterDomain::Clients).await.unwrap();
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(listed[1].filter, tree());

        assert!(service.list(&owner, FilterDomain::Conversations).await.unwrap().is_empty());
        assert!(service.list(&OwnerId::from("u2"), FilterDomain::Clients).await.unwrap().is_empty());

        assert!(service.delete(first.id).await.unwrap());
        assert!(!service.delete(first.id).await.unwrap());
        assert!(!service.delete(SavedFilterId::new()).await.unwrap());
        assert_eq!(service.list(&owner, FilterDomain::Clients).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn names_are_unique_per_owner_and_domain() {
        let service = FilterPersistenceService::new(Arc::new(MemoryStorage::new()));
        let owner = OwnerId::from("u1");
        let saved = service.save("Ativos", &tree(), &owner, FilterDomain::Clients).await.unwrap();

        let err = service.save("ativos ", &tree(), &owner, FilterDomain::Clients).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::DuplicateName(_))));

        service.save("Ativos", &tree(), &owner, FilterDomain::Conversations).await.unwrap();
        service.save("Ativos", &tree(), &OwnerId::from("u2"), FilterDomain::Clients).await.unwrap();

        let replaced = service.replace(saved.id, "Ativos", &tree(), &owner, FilterDomain::Clients).await.unwrap();
        assert_ne!(replaced.id, saved.id);
        let listed = service.list(&owner, FilterDomain::Clients).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, replaced.id);
    }

    #[tokio::test]
    async fn backend_failures_are_storage_errors() {
        let service = FilterPersistenceService::new(Arc::new(Recording::failing()));
        let owner = OwnerId::from("u1");
        let err = service.save("Ativos", &tree(), &owner, FilterDomain::Clients).await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage(StorageError::Backend(_))));
        assert!(err.is_retryable());
        assert!(service.list(&owner, FilterDomain::Clients).await.is_err());
        assert!(service.delete(SavedFilterId::new()).await.is_err());
    }

    #[tokio::test]
    async fn undecodable_rows_are_skipped() {
        let storage = Arc::new(MemoryStorage::new());
        let service = FilterPersistenceService::new(storage.clone());
        let owner = OwnerId::from("u1");
        service.save("Bom", &tree(), &owner, FilterDomain::Clients).await.unwrap();
        storage
            .insert(SavedFilterRecord {
                id: SavedFilterId::new(),
                name: "Quebrado".into(),
                filter_data: "{\"type\": \"rule\"".into(),
                owner: owner.clone(),
                domain: FilterDomain::Clients,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let listed = service.list(&owner, FilterDomain::Clients).await.unwrap();
        assert_eq!(listed.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["Bom"]);
    }
}
