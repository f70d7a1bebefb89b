//! The one shape the fetch layer receives: every active filter of a session as remote predicates.

use chrono::{DateTime, SecondsFormat, Utc};
use filterql::selection::predicate::{like_escape, Clause, CompiledFilter, RemoteOperator, RemotePredicate, RemoteValue, SkippedRule};
use filterql::{FilterCatalog, PredicateCompiler};
use tracing::warn;

use crate::config::SessionConfig;
use crate::state::FilterState;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryProjection {
    /// OR over the remote search columns.
    pub search: Option<RemotePredicate>,
    /// Quick filters, tags and custom field filters, each one a conjunct.
    pub predicates: Vec<RemotePredicate>,
    /// The compiled advanced tree, if it has rules.
    pub advanced: Option<CompiledFilter>,
}

impl QueryProjection {
    /// Conjunction of everything; `None` when nothing constrains the query.
    pub fn predicate(&self) -> Option<RemotePredicate> {
        let mut parts = Vec::with_capacity(self.predicates.len() + 2);
        parts.extend(self.search.clone());
        parts.extend(self.predicates.iter().cloned());
        parts.extend(self.advanced.as_ref().and_then(|compiled| compiled.predicate.clone()));
        RemotePredicate::all(parts)
    }

    pub fn to_query_params(&self) -> Vec<(String, String)> { self.predicate().map(|p| p.to_query_params()).unwrap_or_default() }

    pub fn is_unconstrained(&self) -> bool { self.predicate().is_none() }

    pub fn skipped(&self) -> &[SkippedRule] { self.advanced.as_ref().map(|c| c.skipped.as_slice()).unwrap_or_default() }
}

fn clause(column: &str, operator: RemoteOperator, value: RemoteValue) -> RemotePredicate { Clause::new(column, operator, value).into() }

fn literal(value: impl ToString) -> RemoteValue { RemoteValue::Literal(value.to_string()) }

pub(crate) fn project(state: &FilterState, debounced_search: &str, config: &SessionConfig, catalog: &FilterCatalog, now: DateTime<Utc>) -> QueryProjection {
    let term = debounced_search.trim();
    let search = if term.is_empty() {
        None
    } else {
        let pattern = RemoteValue::Pattern(format!("%{}%", like_escape(term)));
        RemotePredicate::any(config.remote_search_columns.iter().map(|column| clause(column, RemoteOperator::ILike, pattern.clone())).collect())
    };

    let mut predicates = Vec::new();
    if let Some(status) = &state.status {
        predicates.push(clause("status", RemoteOperator::Eq, literal(status)));
    }
    if let Some(segment) = &state.segment {
        predicates.push(clause("tags", RemoteOperator::Cs, RemoteValue::Array(vec![segment.clone()])));
    }
    if !state.tags.is_empty() {
        predicates.push(clause("tags", RemoteOperator::Ov, RemoteValue::Array(state.tags.clone())));
    }
    if let Some(window) = state.last_contact {
        predicates.push(clause("updated_at", RemoteOperator::Gte, literal(window.since(now).to_rfc3339_opts(SecondsFormat::Secs, true))));
    }
    if let Some(min) = state.min_rating {
        predicates.push(clause("rating", RemoteOperator::Gte, literal(min)));
    }
    if let Some(flag) = state.has_whatsapp {
        predicates.push(clause("has_whatsapp", RemoteOperator::Eq, literal(flag)));
    }
    for filter in state.custom_fields.values() {
        let column = catalog.field(&filter.field).map(|f| f.remote_column()).unwrap_or_else(|| format!("custom_fields->>{}", filter.field));
        predicates.push(match filter.value_text() {
            Some(value) => clause(&column, RemoteOperator::Eq, RemoteValue::Literal(value)),
            None => clause(&column, RemoteOperator::Is, RemoteValue::Null),
        });
    }

    let advanced = if state.has_advanced_rules() {
        match PredicateCompiler::new(catalog).at(now).with_max_depth(config.max_depth).compile(&state.advanced) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                warn!("advanced filter left out of the query: {e}");
                None
            }
        }
    } else {
        None
    };

    QueryProjection { search, predicates, advanced }
}
