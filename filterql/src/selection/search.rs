//! Free-text quick search, layered next to the filter tree rather than inside it.

use serde_json::Value;

use crate::ast::FilterGroup;
use crate::catalog::FieldId;
use crate::collation;
use crate::error::EvalError;
use crate::selection::filter::{Evaluator, Filterable};

pub const DEFAULT_SEARCH_FIELDS: [&str; 4] = ["name", "address", "category", "types"];

/// Case-insensitive substring match over a fixed set of fields; any field may match.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickSearch {
    term: String,
    fields: Vec<FieldId>,
}

impl QuickSearch {
    /// `None` for blank terms.
    pub fn new(term: &str) -> Option<Self> { Self::over(term, DEFAULT_SEARCH_FIELDS.iter().map(|f| FieldId::from(*f)).collect()) }

    pub fn over(term: &str, fields: Vec<FieldId>) -> Option<Self> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return None;
        }
        Some(Self { term, fields })
    }

    pub fn term(&self) -> &str { &self.term }

    pub fn fields(&self) -> &[FieldId] { &self.fields }

    pub fn matches<R: Filterable + ?Sized>(&self, record: &R) -> bool {
        self.fields.iter().any(|field| {
            record.value(field.as_str()).filter(|v| !matches!(v, Value::Null)).and_then(collation::text).is_some_and(|text| text.contains(&self.term))
        })
    }
}

/// Quick search AND filter tree. Either part may be absent; with both absent every record passes.
#[derive(Debug, Clone)]
pub struct RecordFilter<'a> {
    evaluator: Evaluator<'a>,
    search: Option<QuickSearch>,
    tree: Option<&'a FilterGroup>,
}

impl<'a> RecordFilter<'a> {
    pub fn new(evaluator: Evaluator<'a>) -> Self { Self { evaluator, search: None, tree: None } }

    pub fn with_search(mut self, search: Option<QuickSearch>) -> Self {
        self.search = search;
        self
    }

    pub fn with_tree(mut self, tree: Option<&'a FilterGroup>) -> Self {
        self.tree = tree;
        self
    }

    pub fn is_active(&self) -> bool { self.search.is_some() || self.tree.is_some_and(|t| t.rule_count() > 0) }

    pub fn matches<R: Filterable + ?Sized>(&self, record: &R) -> Result<bool, EvalError> {
        if let Some(search) = &self.search {
            if !search.matches(record) {
                return Ok(false);
            }
        }
        match self.tree {
            Some(tree) => self.evaluator.evaluate(record, tree),
            None => Ok(true),
        }
    }

    /// Keeps matching records. Records the tree cannot be evaluated against are dropped.
    pub fn apply<R: Filterable + Clone>(&self, records: &[R]) -> Vec<R> {
        records.iter().filter(|record| self.matches(*record).unwrap_or(false)).cloned().collect()
    }
}
