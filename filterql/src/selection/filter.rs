//! Evaluate filter trees against in-memory records. Used for instant filtering of data already on hand, and as
//! the reference semantics the remote compiler is held to.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::trace;

use crate::ast::{Condition, FilterGroup, FilterNode, FilterRule, DEFAULT_MAX_DEPTH};
use crate::catalog::{FieldType, FilterCatalog, FilterableField, Operator};
use crate::collation::{self, DateValue};
use crate::error::EvalError;

/// Flat field-id → value view of a record.
pub trait Filterable {
    fn value(&self, field: &str) -> Option<&Value>;
}

impl Filterable for Map<String, Value> {
    fn value(&self, field: &str) -> Option<&Value> { self.get(field) }
}

impl Filterable for Value {
    fn value(&self, field: &str) -> Option<&Value> { self.as_object().and_then(|o| o.get(field)) }
}

impl Filterable for HashMap<String, Value> {
    fn value(&self, field: &str) -> Option<&Value> { self.get(field) }
}

impl Filterable for BTreeMap<String, Value> {
    fn value(&self, field: &str) -> Option<&Value> { self.get(field) }
}

impl<T: Filterable + ?Sized> Filterable for &T {
    fn value(&self, field: &str) -> Option<&Value> { (**self).value(field) }
}

/// Looks a field up on a record. Custom fields not present at the top level are read from the record's
/// `custom_fields` object.
pub fn field_value<'r, R: Filterable + ?Sized>(record: &'r R, field: &FilterableField) -> Option<&'r Value> {
    match record.value(field.id.as_str()) {
        Some(value) => Some(value),
        None if field.is_custom => record.value("custom_fields").and_then(|custom| custom.get(field.id.as_str())),
        None => None,
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator<'a> {
    catalog: &'a FilterCatalog,
    now: DateTime<Utc>,
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(catalog: &'a FilterCatalog) -> Self { Self { catalog, now: Utc::now(), max_depth: DEFAULT_MAX_DEPTH } }

    /// Reference time for `lastDays` / `nextDays`.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// AND/OR reduction over the group's active children. A group with no active children matches everything.
    pub fn evaluate<R: Filterable + ?Sized>(&self, record: &R, group: &FilterGroup) -> Result<bool, EvalError> {
        if group.exceeds_depth(self.max_depth) {
            return Err(EvalError::DepthExceeded { max: self.max_depth });
        }
        Ok(self.evaluate_group(record, group))
    }

    fn evaluate_group<R: Filterable + ?Sized>(&self, record: &R, group: &FilterGroup) -> bool {
        let active: Vec<&FilterNode> = group
            .rules
            .iter()
            .filter(|node| match node {
                FilterNode::Rule(rule) => rule.is_active(),
                FilterNode::Group(_) => true,
            })
            .collect();
        if active.is_empty() {
            return true;
        }
        let eval = |node: &&FilterNode| match node {
            FilterNode::Rule(rule) => self.evaluate_rule(record, rule),
            FilterNode::Group(child) => self.evaluate_group(record, child),
        };
        match group.condition {
            Condition::And => active.iter().all(eval),
            Condition::Or => active.iter().any(eval),
        }
    }

    /// A single rule. Unknown fields, operators not offered for the field's type and malformed values all
    /// evaluate to `false`.
    pub fn evaluate_rule<R: Filterable + ?Sized>(&self, record: &R, rule: &FilterRule) -> bool {
        let Some(field) = self.catalog.field(&rule.field) else {
            trace!("rule {} references unknown field {}", rule.id, rule.field);
            return false;
        };
        if !self.catalog.operators().is_legal(field.field_type, rule.operator) {
            trace!("operator {} is not offered for {} field {}", rule.operator, field.field_type, field.id);
            return false;
        }

        let value = field_value(record, field);
        match rule.operator {
            Operator::IsEmpty => return collation::is_empty(value),
            Operator::IsNotEmpty => return !collation::is_empty(value),
            _ => {}
        }
        // Missing values only ever satisfy isEmpty.
        let Some(value) = value.filter(|v| !v.is_null()) else { return false };

        let expected = rule.value_str();
        match field.field_type {
            FieldType::Text | FieldType::Select => compare_text(value, rule.operator, expected),
            FieldType::Number => compare_number(value, rule.operator, expected),
            FieldType::Date => self.compare_date(value, rule.operator, expected),
            FieldType::Boolean => compare_boolean(value, rule.operator, expected),
        }
    }

    fn compare_date(&self, value: &Value, operator: Operator, expected: &str) -> bool {
        let Some(actual) = collation::date(value) else { return false };
        match operator {
            Operator::LastDays => match collation::parse_days(expected) {
                Some(days) => actual.instant >= self.now - Duration::days(days) && actual.instant <= self.now,
                None => false,
            },
            Operator::NextDays => match collation::parse_days(expected) {
                Some(days) => actual.instant >= self.now && actual.instant <= self.now + Duration::days(days),
                None => false,
            },
            Operator::Between => {
                let Some((start, end)) = collation::split_range(expected) else { return false };
                match (collation::parse_date(start), collation::parse_date(end)) {
                    (Some(start), Some(end)) => actual.instant >= start.instant && actual.instant < end.end_exclusive(),
                    _ => false,
                }
            }
            _ => match collation::parse_date(expected) {
                Some(bound) => date_cmp(actual, operator, bound),
                None => false,
            },
        }
    }
}

fn date_cmp(actual: DateValue, operator: Operator, bound: DateValue) -> bool {
    // A date-only bound covers its whole day.
    let on = match bound.date_only {
        true => actual.instant >= bound.instant && actual.instant < bound.end_exclusive(),
        false => actual.instant == bound.instant,
    };
    match operator {
        Operator::Equals => on,
        Operator::NotEquals => !on,
        Operator::Before => actual.instant < bound.instant,
        Operator::After if bound.date_only => actual.instant >= bound.end_exclusive(),
        Operator::After => actual.instant > bound.instant,
        _ => false,
    }
}

fn compare_text(value: &Value, operator: Operator, expected: &str) -> bool {
    let Some(actual) = collation::text(value) else { return false };
    let expected = expected.to_lowercase();
    match operator {
        Operator::Equals => actual == expected,
        Operator::NotEquals => actual != expected,
        Operator::Contains => actual.contains(&expected),
        Operator::NotContains => !actual.contains(&expected),
        Operator::StartsWith => actual.starts_with(&expected),
        Operator::EndsWith => actual.ends_with(&expected),
        Operator::In => collation::split_list(&expected).contains(&actual.as_str()),
        Operator::NotIn => {
            let options = collation::split_list(&expected);
            !options.is_empty() && !options.contains(&actual.as_str())
        }
        _ => false,
    }
}

fn compare_number(value: &Value, operator: Operator, expected: &str) -> bool {
    let Some(actual) = collation::number(value) else { return false };
    if operator == Operator::Between {
        let Some((low, high)) = collation::split_range(expected) else { return false };
        return match (collation::parse_number(low), collation::parse_number(high)) {
            (Some(low), Some(high)) => actual >= low && actual <= high,
            _ => false,
        };
    }
    let Some(expected) = collation::parse_number(expected) else { return false };
    match operator {
        Operator::Equals => actual == expected,
        Operator::NotEquals => actual != expected,
        Operator::Gt => actual > expected,
        Operator::Gte => actual >= expected,
        Operator::Lt => actual < expected,
        Operator::Lte => actual <= expected,
        _ => false,
    }
}

fn compare_boolean(value: &Value, operator: Operator, expected: &str) -> bool {
    match (collation::boolean(value), collation::parse_boolean(expected)) {
        (Some(actual), Some(expected)) => match operator {
            Operator::Equals => actual == expected,
            Operator::NotEquals => actual != expected,
            _ => false,
        },
        _ => false,
    }
}

#[derive(Debug, PartialEq)]
pub enum FilterResult<R> {
    Pass(R),
    Skip(R),
    Error(R, EvalError),
}

/// Runs every record of an iterator through a tree.
pub struct FilterIterator<'a, I> {
    iter: I,
    evaluator: Evaluator<'a>,
    group: &'a FilterGroup,
}

impl<'a, I, R> FilterIterator<'a, I>
where
    I: Iterator<Item = R>,
    R: Filterable,
{
    pub fn new(iter: I, evaluator: Evaluator<'a>, group: &'a FilterGroup) -> Self { Self { iter, evaluator, group } }
}

impl<I, R> Iterator for FilterIterator<'_, I>
where
    I: Iterator<Item = R>,
    R: Filterable,
{
    type Item = FilterResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|record| match self.evaluator.evaluate(&record, self.group) {
            Ok(true) => FilterResult::Pass(record),
            Ok(false) => FilterResult::Skip(record),
            Err(e) => FilterResult::Error(record, e),
        })
    }
}
