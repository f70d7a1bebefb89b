//! One filter session per list view. Owns the quick filters, the search term, the advanced tree and the saved
//! filter cache, and turns them into a [`QueryProjection`] for the fetch layer.
//!
//! All state changes are synchronous. Only the search debounce and the persistence calls suspend. Persistence
//! futures hold the session weakly, so a result that arrives after [`UnifiedFilterSession::close`] or after the
//! last handle is dropped is discarded instead of being applied.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use filterql::selection::search::{QuickSearch, RecordFilter};
use filterql::{Evaluator, FieldId, FilterCatalog, FilterGroup, Filterable, TreeBuilder};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::debounce::Debouncer;
use crate::error::{SessionError, ValidationError};
use crate::projection::{self, QueryProjection};
use crate::saved::{FilterDomain, OwnerId, SavedFilter, SavedFilterId};
use crate::service::FilterPersistenceService;
use crate::state::{CustomFieldFilter, FilterState, LastContact};
use crate::storage::lock;
use crate::summary;

/// The saved filter list as last loaded. A failed load leaves `filters` empty and sets `error`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedFilters {
    pub filters: Vec<SavedFilter>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct UnifiedFilterSession(Arc<Inner>);

/// Handle that does not keep the session alive.
#[derive(Clone)]
pub struct WeakFilterSession(Weak<Inner>);

impl WeakFilterSession {
    pub fn upgrade(&self) -> Option<UnifiedFilterSession> { self.0.upgrade().map(UnifiedFilterSession) }
}

struct Inner {
    config: SessionConfig,
    builder: TreeBuilder,
    service: FilterPersistenceService,
    owner: OwnerId,
    domain: FilterDomain,
    state: Mutex<FilterState>,
    saved: Mutex<SavedFilters>,
    debouncer: Debouncer,
    closed: AtomicBool,
}

impl std::fmt::Debug for UnifiedFilterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedFilterSession")
            .field("owner", &self.0.owner)
            .field("domain", &self.0.domain)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl UnifiedFilterSession {
    pub fn new(builder: TreeBuilder, service: FilterPersistenceService, owner: OwnerId, domain: FilterDomain) -> Self {
        Self::with_config(builder, service, owner, domain, SessionConfig::default())
    }

    pub fn with_config(builder: TreeBuilder, service: FilterPersistenceService, owner: OwnerId, domain: FilterDomain, config: SessionConfig) -> Self {
        let state = FilterState::new(builder.root());
        let service = service.with_max_depth(config.max_depth);
        Self(Arc::new(Inner {
            debouncer: Debouncer::new(config.debounce()),
            config,
            builder,
            service,
            owner,
            domain,
            state: Mutex::new(state),
            saved: Mutex::new(SavedFilters::default()),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn downgrade(&self) -> WeakFilterSession { WeakFilterSession(Arc::downgrade(&self.0)) }

    pub fn config(&self) -> &SessionConfig { &self.0.config }

    pub fn builder(&self) -> &TreeBuilder { &self.0.builder }

    pub fn catalog(&self) -> &Arc<FilterCatalog> { self.0.builder.catalog() }

    pub fn owner(&self) -> &OwnerId { &self.0.owner }

    pub fn domain(&self) -> FilterDomain { self.0.domain }

    /// Stops the session. Pending search commits are dropped and persistence results that arrive later are
    /// ignored.
    pub fn close(&self) {
        if !self.0.closed.swap(true, Ordering::SeqCst) {
            self.0.debouncer.cancel();
            debug!("filter session for {}/{} closed", self.0.owner, self.0.domain);
        }
    }

    pub fn is_closed(&self) -> bool { self.0.closed.load(Ordering::SeqCst) }

    fn update<T>(&self, f: impl FnOnce(&mut FilterState) -> T) -> T { f(&mut lock(&self.0.state)) }

    /// A copy of the current filter state.
    pub fn snapshot(&self) -> FilterState { lock(&self.0.state).clone() }

    // search

    /// Updates the raw term at once and schedules the debounced commit.
    pub fn set_search_term(&self, term: &str) {
        self.update(|state| state.search_term = term.to_string());
        if !self.is_closed() {
            self.0.debouncer.push(term.to_string());
        }
    }

    pub fn search_term(&self) -> String { lock(&self.0.state).search_term.clone() }

    pub fn debounced_search(&self) -> String { self.0.debouncer.current() }

    /// Commits the raw term without waiting for the quiet period.
    pub fn flush_search(&self) { self.0.debouncer.flush(self.search_term()); }

    pub fn subscribe_search(&self) -> watch::Receiver<String> { self.0.debouncer.subscribe() }

    // quick filters

    pub fn set_status(&self, status: Option<String>) { self.update(|state| state.status = status); }

    pub fn set_segment(&self, segment: Option<String>) { self.update(|state| state.segment = segment); }

    pub fn set_last_contact(&self, window: Option<LastContact>) { self.update(|state| state.last_contact = window); }

    pub fn set_min_rating(&self, min: Option<f64>) { self.update(|state| state.min_rating = min.filter(|m| m.is_finite())); }

    pub fn set_has_whatsapp(&self, flag: Option<bool>) { self.update(|state| state.has_whatsapp = flag); }

    /// Selects the tag, or deselects it if already selected.
    pub fn toggle_tag(&self, tag: &str) {
        self.update(|state| match state.tags.iter().position(|t| t == tag) {
            Some(index) => {
                state.tags.remove(index);
            }
            None => state.tags.push(tag.to_string()),
        });
    }

    pub fn set_tags(&self, tags: Vec<String>) {
        self.update(|state| {
            state.tags.clear();
            for tag in tags {
                if !state.tags.contains(&tag) {
                    state.tags.push(tag);
                }
            }
        });
    }

    /// Adds a custom field filter, replacing any existing one on the same field.
    pub fn add_custom_field_filter(&self, filter: CustomFieldFilter) {
        self.update(|state| {
            state.custom_fields.insert(filter.field.clone(), filter);
        });
    }

    pub fn remove_custom_field_filter(&self, field: &FieldId) -> bool { self.update(|state| state.custom_fields.shift_remove(field).is_some()) }

    pub fn custom_field_filters(&self) -> Vec<CustomFieldFilter> { lock(&self.0.state).custom_fields.values().cloned().collect() }

    // advanced tree

    pub fn advanced_filter(&self) -> FilterGroup { lock(&self.0.state).advanced.clone() }

    /// Replaces the advanced tree. Trees deeper than the configured limit are refused and the current tree kept.
    pub fn set_advanced_filter(&self, tree: FilterGroup) -> Result<(), SessionError> {
        let max = self.0.config.max_depth;
        if tree.exceeds_depth(max) {
            warn!("refusing advanced filter {} deeper than {max}", tree.id);
            return Err(ValidationError::DepthExceeded { max }.into());
        }
        self.update(|state| state.advanced = tree);
        Ok(())
    }

    /// Applies a builder edit to the advanced tree, e.g. `session.edit_advanced(|tree, b| b.add_rule(tree, None))`.
    pub fn edit_advanced(&self, edit: impl FnOnce(&FilterGroup, &TreeBuilder) -> FilterGroup) -> Result<(), SessionError> {
        let next = edit(&self.advanced_filter(), &self.0.builder);
        self.set_advanced_filter(next)
    }

    pub fn clear_advanced_filter(&self) {
        let root = self.0.builder.root();
        self.update(|state| state.advanced = root);
    }

    pub fn has_advanced_rules(&self) -> bool { lock(&self.0.state).has_advanced_rules() }

    // derived

    pub fn has_active_filters(&self) -> bool { lock(&self.0.state).has_active_filters() }

    /// Back to no filters at all. The cleared search is committed immediately.
    pub fn clear_all_filters(&self) {
        let root = self.0.builder.root();
        self.update(|state| *state = FilterState::new(root));
        self.0.debouncer.flush(String::new());
    }

    pub fn active_filter_summaries(&self) -> Vec<String> { summary::active_filter_summaries(&lock(&self.0.state)) }

    /// Everything the remote query needs, with date windows relative to `now`.
    pub fn query_projection(&self, now: DateTime<Utc>) -> QueryProjection {
        let debounced = self.debounced_search();
        projection::project(&lock(&self.0.state), &debounced, &self.0.config, self.catalog(), now)
    }

    /// Local filter over the debounced search term and the advanced tree, for records already loaded.
    pub fn record_filter(&self) -> LocalFilter {
        let state = lock(&self.0.state);
        LocalFilter {
            catalog: self.catalog().clone(),
            search: QuickSearch::over(&self.debounced_search(), self.0.config.quick_search_fields.clone()),
            tree: state.has_advanced_rules().then(|| state.advanced.clone()),
            max_depth: self.0.config.max_depth,
        }
    }

    // saved filters

    pub fn saved_filters(&self) -> SavedFilters { lock(&self.0.saved).clone() }

    /// Reloads the saved filter list. On failure the list is emptied and the error flag set.
    pub fn refresh_saved_filters(&self) -> impl Future<Output = Result<usize, SessionError>> + Send + 'static {
        let weak = self.downgrade();
        let service = self.0.service.clone();
        let (owner, domain) = (self.0.owner.clone(), self.0.domain);
        async move {
            let result = service.list(&owner, domain).await;
            let session = live(&weak, "saved filter list")?;
            let mut saved = lock(&session.0.saved);
            match result {
                Ok(filters) => {
                    let count = filters.len();
                    *saved = SavedFilters { filters, error: None };
                    Ok(count)
                }
                Err(e) => {
                    warn!("loading saved filters failed: {e}");
                    *saved = SavedFilters { filters: Vec::new(), error: Some(e.to_string()) };
                    Err(e.into())
                }
            }
        }
    }

    /// Saves the current advanced tree under `name`. If the session is closed before the backend answers, the
    /// result is not added to the list and `SessionError::Closed` is returned; the backend may still have
    /// stored it.
    pub fn save_current(&self, name: &str) -> impl Future<Output = Result<SavedFilter, SessionError>> + Send + 'static {
        let weak = self.downgrade();
        let service = self.0.service.clone();
        let (owner, domain) = (self.0.owner.clone(), self.0.domain);
        let tree = self.advanced_filter();
        let name = name.to_string();
        let closed = self.is_closed();
        async move {
            if closed {
                return Err(SessionError::Closed);
            }
            let saved = service.save(&name, &tree, &owner, domain).await?;
            let session = live(&weak, "saved filter")?;
            lock(&session.0.saved).filters.insert(0, saved.clone());
            Ok(saved)
        }
    }

    pub fn delete_saved(&self, id: SavedFilterId) -> impl Future<Output = Result<bool, SessionError>> + Send + 'static {
        let weak = self.downgrade();
        let service = self.0.service.clone();
        let closed = self.is_closed();
        async move {
            if closed {
                return Err(SessionError::Closed);
            }
            let removed = service.delete(id).await?;
            let session = live(&weak, "saved filter deletion")?;
            lock(&session.0.saved).filters.retain(|f| f.id != id);
            Ok(removed)
        }
    }

    /// Makes a saved filter the advanced tree. No backend call.
    pub fn apply_saved(&self, saved: &SavedFilter) -> Result<(), SessionError> { self.0.service.apply(saved, self) }
}

/// The session behind `weak`, unless it was dropped or closed while a call was in flight.
fn live(weak: &WeakFilterSession, what: &str) -> Result<UnifiedFilterSession, SessionError> {
    match weak.upgrade() {
        Some(session) if !session.is_closed() => Ok(session),
        _ => {
            debug!("discarding stale {what} result");
            Err(SessionError::Closed)
        }
    }
}

/// Owned snapshot of a session's local filter.
#[derive(Debug, Clone)]
pub struct LocalFilter {
    catalog: Arc<FilterCatalog>,
    search: Option<QuickSearch>,
    tree: Option<FilterGroup>,
    max_depth: usize,
}

impl LocalFilter {
    fn record_filter(&self) -> RecordFilter<'_> {
        RecordFilter::new(Evaluator::new(&self.catalog).with_max_depth(self.max_depth)).with_search(self.search.clone()).with_tree(self.tree.as_ref())
    }

    pub fn is_active(&self) -> bool { self.record_filter().is_active() }

    pub fn matches<R: Filterable + ?Sized>(&self, record: &R) -> bool { self.record_filter().matches(record).unwrap_or(false) }

    pub fn apply<R: Filterable + Clone>(&self, records: &[R]) -> Vec<R> { self.record_filter().apply(records) }
}
