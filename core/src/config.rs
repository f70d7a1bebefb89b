use std::time::Duration;

use filterql::selection::search::DEFAULT_SEARCH_FIELDS;
use filterql::{FieldId, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Serialize};

/// Tunables for a [`UnifiedFilterSession`](crate::session::UnifiedFilterSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period before a search keystroke is committed.
    pub debounce_ms: u64,
    pub max_depth: usize,
    /// Record fields searched locally.
    pub quick_search_fields: Vec<FieldId>,
    /// Columns searched by the remote query.
    pub remote_search_columns: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_depth: DEFAULT_MAX_DEPTH,
            quick_search_fields: DEFAULT_SEARCH_FIELDS.iter().map(|f| FieldId::from(*f)).collect(),
            remote_search_columns: vec!["name".into(), "email".into(), "phone".into()],
        }
    }
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_quick_search_fields(mut self, fields: Vec<FieldId>) -> Self {
        self.quick_search_fields = fields;
        self
    }

    pub fn with_remote_search_columns(mut self, columns: Vec<String>) -> Self {
        self.remote_search_columns = columns;
        self
    }
}
