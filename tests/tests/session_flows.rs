mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{clients, now};
use filtra::core::SessionError;
use filtra::error::{ServiceError, ValidationError};
use filtra::sled::SledFilterStore;
use filtra::sqlite::SqliteFilterStore;
use filtra::{
    CustomFieldFilter, FilterCatalog, FilterDomain, FilterNode, FilterPersistenceService, LastContact, Operator, OwnerId, SavedFilterStorage,
    TreeBuilder, UnifiedFilterSession,
};

fn session_on(storage: Arc<dyn SavedFilterStorage>, owner: &str) -> UnifiedFilterSession {
    let builder = TreeBuilder::new(FilterCatalog::builtin());
    UnifiedFilterSession::new(builder, FilterPersistenceService::new(storage), OwnerId::from(owner), FilterDomain::Clients)
}

/// `rating >= min` as the only advanced rule.
fn rate_at_least(session: &UnifiedFilterSession, min: &str) -> Result<(), SessionError> {
    session.edit_advanced(|_, builder| {
        let tree = builder.add_rule(&builder.root(), Some(&"rating".into()));
        let Some(FilterNode::Rule(rule)) = tree.rules.first().cloned() else { return tree };
        let mut rule = builder.set_rule_operator(&rule, Operator::Gte);
        rule.value = Some(min.into());
        tree.update_rule(&rule.id.clone(), rule)
    })
}

async fn saved_filter_round_trip(storage: Arc<dyn SavedFilterStorage>) -> Result<()> {
    let session = session_on(storage.clone(), "u1");
    rate_at_least(&session, "4")?;
    let good = session.save_current("Bem avaliados").await?;
    rate_at_least(&session, "2")?;
    let any = session.save_current("Qualquer nota").await?;
    assert_eq!(session.saved_filters().filters.iter().map(|f| f.id).collect::<Vec<_>>(), vec![any.id, good.id]);

    let err = session.save_current("  bem AVALIADOS ").await.unwrap_err();
    assert!(matches!(err, SessionError::Service(ServiceError::Validation(ValidationError::DuplicateName(_)))));

    // a second session for the same owner sees the same list
    let other = session_on(storage.clone(), "u1");
    assert_eq!(other.refresh_saved_filters().await?, 2);
    let loaded = other.saved_filters().filters.into_iter().find(|f| f.id == good.id).unwrap();
    assert_eq!(loaded.filter, good.filter);

    other.apply_saved(&loaded)?;
    let rows = clients();
    let names: Vec<_> = other.record_filter().apply(&rows).iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec!["casa da pizza", "padaria central"]);

    // another owner sees nothing
    let stranger = session_on(storage.clone(), "u2");
    assert_eq!(stranger.refresh_saved_filters().await?, 0);

    assert!(other.delete_saved(good.id).await?);
    assert!(!other.delete_saved(good.id).await?);
    assert_eq!(session.refresh_saved_filters().await?, 1);
    Ok(())
}

#[tokio::test]
async fn saved_filters_on_sqlite() -> Result<()> { saved_filter_round_trip(Arc::new(SqliteFilterStore::open_in_memory().await?)).await }

#[tokio::test]
async fn saved_filters_on_sled() -> Result<()> { saved_filter_round_trip(Arc::new(SledFilterStore::new_test()?)).await }

#[tokio::test]
async fn empty_and_blank_saves_are_refused() -> Result<()> {
    let session = session_on(Arc::new(SledFilterStore::new_test()?), "u1");
    let err = session.save_current("Nada").await.unwrap_err();
    assert!(matches!(err, SessionError::Service(ServiceError::Validation(ValidationError::EmptyFilter))));
    rate_at_least(&session, "4")?;
    let err = session.save_current("").await.unwrap_err();
    assert!(matches!(err, SessionError::Service(ServiceError::Validation(ValidationError::BlankName))));
    assert!(session.saved_filters().filters.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn quick_filters_and_advanced_tree_project_together() -> Result<()> {
    let session = session_on(Arc::new(filtra::MemoryStorage::new()), "u1");
    session.set_search_term("pizza");
    session.set_status(Some("Active".into()));
    session.set_last_contact(Some(LastContact::Week));
    session.add_custom_field_filter(CustomFieldFilter::new("pet", "Pet", "Rex"));
    rate_at_least(&session, "4")?;

    // the search term is not projected until the debounce settles
    assert!(session.query_projection(now()).search.is_none());
    tokio::time::sleep(Duration::from_millis(session.config().debounce_ms + 10)).await;
    let projection = session.query_projection(now());
    assert_eq!(projection.search.as_ref().map(|s| s.to_string()).as_deref(), Some("or(name.ilike.%pizza%,email.ilike.%pizza%,phone.ilike.%pizza%)"));

    let params = projection.to_query_params();
    assert!(params.contains(&("status".to_string(), "eq.Active".to_string())));
    assert!(params.contains(&("updated_at".to_string(), "gte.2024-06-08T12:00:00Z".to_string())));
    assert!(params.contains(&("custom_fields->>pet".to_string(), "eq.Rex".to_string())));
    assert!(params.contains(&("rating".to_string(), "gte.4".to_string())));
    assert!(params.contains(&("or".to_string(), "(name.ilike.%pizza%,email.ilike.%pizza%,phone.ilike.%pizza%)".to_string())));

    let summaries = session.active_filter_summaries();
    assert!(summaries.contains(&"Busca: \"pizza\"".to_string()));
    assert!(summaries.contains(&"1 regra avançada".to_string()));

    session.clear_all_filters();
    assert!(session.query_projection(now()).is_unconstrained());
    Ok(())
}

#[tokio::test]
async fn results_after_close_are_discarded() -> Result<()> {
    let session = session_on(Arc::new(SqliteFilterStore::open_in_memory().await?), "u1");
    rate_at_least(&session, "4")?;
    let pending = session.save_current("Bem avaliados");
    session.close();
    assert!(matches!(pending.await, Err(SessionError::Closed)));
    assert!(session.saved_filters().filters.is_empty());
    Ok(())
}
