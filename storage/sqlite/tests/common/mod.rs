use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use filtra_core::filterql::{conversion, Condition, FilterGroup, FilterNode, FilterRule, Operator};
use filtra_core::{FilterDomain, OwnerId, SavedFilterId, SavedFilterRecord};
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    // if LOG_LEVEL env var is set, use it
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        tracing_subscriber::fmt().with_max_level(Level::from_str(&level).unwrap()).with_test_writer().init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init();
    }
}

pub fn status_tree(status: &str) -> FilterGroup {
    FilterGroup {
        id: "group-1".into(),
        condition: Condition::And,
        rules: vec![FilterNode::Rule(FilterRule {
            id: "rule-1".into(),
            field: "status".into(),
            operator: Operator::Equals,
            value: Some(status.into()),
            field_name: Some("Status".into()),
        })],
    }
}

/// A row created `age_secs` seconds before a fixed instant.
pub fn record(name: &str, owner: &str, domain: FilterDomain, age_secs: i64) -> SavedFilterRecord {
    let base: DateTime<Utc> = "2024-06-15T12:00:00Z".parse().unwrap();
    SavedFilterRecord {
        id: SavedFilterId::new(),
        name: name.into(),
        filter_data: conversion::to_json_string(&status_tree(name)).unwrap(),
        owner: OwnerId::from(owner),
        domain,
        created_at: base - Duration::seconds(age_secs),
    }
}
