use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use filterql::{FieldId, FilterGroup};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The UI sentinel for "no quick filter selected".
pub const ALL: &str = "all";

/// Maps a quick filter choice to its value; blank and [`ALL`] mean no filter.
pub fn quick_choice(choice: &str) -> Option<String> {
    let choice = choice.trim();
    if choice.is_empty() || choice.eq_ignore_ascii_case(ALL) {
        None
    } else {
        Some(choice.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastContact {
    Today,
    Week,
    Month,
}

impl LastContact {
    /// Earliest `updated_at` still inside the window.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            LastContact::Today => now.date_naive().and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc()).unwrap_or(now),
            LastContact::Week => now - Duration::days(7),
            LastContact::Month => now.checked_sub_months(Months::new(1)).unwrap_or(now - Duration::days(30)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LastContact::Today => "hoje",
            LastContact::Week => "últimos 7 dias",
            LastContact::Month => "último mês",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown last contact window: {0}")]
pub struct UnknownWindow(pub String);

impl FromStr for LastContact {
    type Err = UnknownWindow;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "today" => Ok(LastContact::Today),
            "week" => Ok(LastContact::Week),
            "month" => Ok(LastContact::Month),
            other => Err(UnknownWindow(other.to_string())),
        }
    }
}

/// A direct equality filter on one custom field, kept outside the advanced tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldFilter {
    pub field: FieldId,
    pub field_name: String,
    pub value: Value,
}

impl CustomFieldFilter {
    pub fn new(field: impl Into<FieldId>, field_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), field_name: field_name.into(), value: value.into() }
    }

    /// The value as the remote query and the summaries spell it.
    pub fn value_text(&self) -> Option<String> {
        match &self.value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CustomFieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field_name, self.value_text().as_deref().unwrap_or("vazio"))
    }
}

/// Everything a session filters on. The debounced search term is not here; it lives in the debouncer.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub search_term: String,
    pub status: Option<String>,
    pub segment: Option<String>,
    pub last_contact: Option<LastContact>,
    pub min_rating: Option<f64>,
    pub has_whatsapp: Option<bool>,
    pub tags: Vec<String>,
    pub custom_fields: IndexMap<FieldId, CustomFieldFilter>,
    pub advanced: FilterGroup,
}

impl FilterState {
    pub fn new(advanced: FilterGroup) -> Self {
        Self {
            search_term: String::new(),
            status: None,
            segment: None,
            last_contact: None,
            min_rating: None,
            has_whatsapp: None,
            tags: Vec::new(),
            custom_fields: IndexMap::new(),
            advanced,
        }
    }

    pub fn has_quick_filters(&self) -> bool {
        self.status.is_some() || self.segment.is_some() || self.last_contact.is_some() || self.min_rating.is_some() || self.has_whatsapp.is_some()
    }

    pub fn has_advanced_rules(&self) -> bool { self.advanced.rule_count() > 0 }

    pub fn has_active_filters(&self) -> bool {
        self.has_quick_filters()
            || !self.search_term.trim().is_empty()
            || !self.tags.is_empty()
            || !self.custom_fields.is_empty()
            || self.has_advanced_rules()
    }
}
