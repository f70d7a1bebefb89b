//! # Filtra
//!
//! Filtra keeps a user's list filters in one place: quick filters (search, status, segment, tags and the like),
//! custom field filters and an advanced filter, which is a tree of AND/OR groups over field rules.
//!
//! ## Key Features
//!
//! - **Pure tree editing**: every [`TreeBuilder`] operation returns a new tree; nothing is mutated in place
//! - **Local evaluation**: [`Evaluator`] decides whether an in-memory record matches a tree
//! - **Remote compilation**: [`PredicateCompiler`] renders a tree in the `column.operator.value` grammar, keeping
//!   nested AND/OR structure intact
//! - **Saved filters**: [`FilterPersistenceService`] stores named trees per owner and list, on SQLite or Sled
//!
//! ## Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use filtra::{FilterCatalog, FilterDomain, FilterPersistenceService, MemoryStorage, OwnerId, TreeBuilder, UnifiedFilterSession};
//! # use filtra::filterql::{FilterNode, Operator};
//! # use serde_json::json;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = TreeBuilder::new(FilterCatalog::builtin());
//!     let service = FilterPersistenceService::new(Arc::new(MemoryStorage::new()));
//!     let session = UnifiedFilterSession::new(builder, service, OwnerId::from("user-1"), FilterDomain::Clients);
//!
//!     // status = Active
//!     session.edit_advanced(|tree, builder| {
//!         let mut rule = builder.new_rule(Some(&"status".into())).expect("status is a built-in field");
//!         rule.operator = Operator::Equals;
//!         rule.value = Some("Active".into());
//!         let mut next = tree.clone();
//!         next.rules.push(FilterNode::Rule(rule));
//!         next
//!     })?;
//!
//!     let records = vec![json!({"name": "Ana", "status": "Active"}), json!({"name": "Bruno", "status": "Lost"})];
//!     assert_eq!(session.record_filter().apply(&records).len(), 1);
//!
//!     let saved = session.save_current("Ativos").await?;
//!     assert_eq!(session.saved_filters().filters[0].id, saved.id);
//!     Ok(())
//! # }
//! ```

pub use filterql;
pub use filtra_core as core;
#[cfg(feature = "sled")]
pub use filtra_storage_sled as sled;
#[cfg(feature = "sqlite")]
pub use filtra_storage_sqlite as sqlite;

// Re-export commonly used types
pub use filterql::{
    Condition, CompiledFilter, Evaluator, FieldId, FieldType, FilterCatalog, FilterGroup, FilterNode, FilterRule, Filterable, NodeId,
    Operator, PredicateCompiler, RemotePredicate, TreeBuilder,
};
pub use filtra_core::{
    error, CustomFieldFilter, FilterDomain, FilterPersistenceService, FilterState, LastContact, LocalFilter, MemoryStorage, OwnerId,
    QueryProjection, SavedFilter, SavedFilterId, SavedFilterStorage, SessionConfig, UnifiedFilterSession,
};
