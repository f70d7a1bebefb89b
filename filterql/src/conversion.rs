//! JSON form of filter trees, as stored in a saved filter's `filter_data`.
//!
//! Trees are written in the tagged form (`"type": "group" | "rule"`). Older saved filters carry no tag; a node
//! is then a rule if it has a `field` and a group otherwise. Such trees are upgraded here, once, so nothing past
//! this boundary ever sees the untagged shape.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::ast::{Condition, FilterGroup, FilterNode, FilterRule, NodeId, DEFAULT_MAX_DEPTH};
use crate::builder::{IdGenerator, NodeKind, UuidIds};
use crate::catalog::Operator;
use crate::error::DecodeError;

/// Borrowing form of [`FilterNode::Group`], so the root carries its `"type"` tag like every nested group.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TaggedRoot<'a> {
    Group(&'a FilterGroup),
}

pub fn to_json(group: &FilterGroup) -> Value {
    // a tree of strings and enums always serializes
    serde_json::to_value(TaggedRoot::Group(group)).unwrap_or(Value::Null)
}

pub fn to_json_string(group: &FilterGroup) -> Result<String, serde_json::Error> { serde_json::to_string(&TaggedRoot::Group(group)) }

pub fn from_json(value: &Value) -> Result<FilterGroup, DecodeError> { from_json_with_depth(value, DEFAULT_MAX_DEPTH) }

pub fn from_json_str(s: &str) -> Result<FilterGroup, DecodeError> { from_json(&serde_json::from_str(s)?) }

pub fn from_json_with_depth(value: &Value, max_depth: usize) -> Result<FilterGroup, DecodeError> {
    if group_depth_exceeds(value, 1, max_depth) {
        return Err(DecodeError::DepthExceeded { max: max_depth });
    }
    if is_tagged(value) {
        return match serde_json::from_value::<FilterNode>(value.clone())? {
            FilterNode::Group(group) => Ok(group),
            FilterNode::Rule(rule) => Err(DecodeError::NotAGroup(rule.id)),
        };
    }
    debug!("upgrading untagged filter tree");
    match legacy_node(value, &UuidIds)? {
        FilterNode::Group(group) => Ok(group),
        FilterNode::Rule(rule) => Err(DecodeError::NotAGroup(rule.id)),
    }
}

fn is_tagged(value: &Value) -> bool { value.get("type").is_some_and(Value::is_string) }

fn group_depth_exceeds(value: &Value, level: usize, max: usize) -> bool {
    let Some(children) = value.get("rules").and_then(Value::as_array) else {
        return false;
    };
    if level > max {
        return true;
    }
    children.iter().any(|child| group_depth_exceeds(child, level + 1, max))
}

fn legacy_node(value: &Value, ids: &dyn IdGenerator) -> Result<FilterNode, DecodeError> {
    let object = value.as_object().ok_or_else(|| DecodeError::Legacy(format!("expected an object, found {value}")))?;
    if object.contains_key("field") {
        legacy_rule(object, ids).map(FilterNode::Rule)
    } else {
        legacy_group(object, ids).map(FilterNode::Group)
    }
}

fn legacy_id(object: &Map<String, Value>, ids: &dyn IdGenerator, kind: NodeKind) -> NodeId {
    match object.get("id") {
        Some(Value::String(id)) if !id.is_empty() => NodeId::new(id.clone()),
        Some(Value::Number(n)) => NodeId::new(n.to_string()),
        _ => ids.next_id(kind),
    }
}

fn legacy_rule(object: &Map<String, Value>, ids: &dyn IdGenerator) -> Result<FilterRule, DecodeError> {
    let field = object.get("field").and_then(Value::as_str).ok_or_else(|| DecodeError::Legacy("rule field must be a string".into()))?;
    let operator = match object.get("operator") {
        Some(Value::String(op)) => op.parse::<Operator>().map_err(|e| DecodeError::Legacy(e.to_string()))?,
        None | Some(Value::Null) => Operator::Equals,
        Some(other) => return Err(DecodeError::Legacy(format!("operator must be a string, found {other}"))),
    };
    let value = match object.get("value") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => return Err(DecodeError::Legacy(format!("rule value must be a scalar, found {other}"))),
    };
    let field_name = object.get("fieldName").or_else(|| object.get("field_name")).and_then(Value::as_str).map(str::to_string);
    Ok(FilterRule { id: legacy_id(object, ids, NodeKind::Rule), field: field.into(), operator, value, field_name })
}

fn legacy_group(object: &Map<String, Value>, ids: &dyn IdGenerator) -> Result<FilterGroup, DecodeError> {
    let condition = match object.get("condition").and_then(Value::as_str).map(str::to_ascii_uppercase).as_deref() {
        None | Some("AND") => Condition::And,
        Some("OR") => Condition::Or,
        Some(other) => return Err(DecodeError::Legacy(format!("unknown condition {other}"))),
    };
    let rules = match object.get("rules") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(children)) => children
            .iter()
            .map(|child| if is_tagged(child) { Ok(serde_json::from_value(child.clone())?) } else { legacy_node(child, ids) })
            .collect::<Result<Vec<_>, DecodeError>>()?,
        Some(other) => return Err(DecodeError::Legacy(format!("rules must be an array, found {other}"))),
    };
    Ok(FilterGroup { id: legacy_id(object, ids, NodeKind::Group), condition, rules })
}
