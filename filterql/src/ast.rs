use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{FieldId, Operator};

/// Nesting limit applied by the evaluator, the compiler and the JSON decoder.
pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self { Self(id.to_string()) }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self { Self(id) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl Condition {
    pub fn flipped(self) -> Self {
        match self {
            Condition::And => Condition::Or,
            Condition::Or => Condition::And,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::And => f.write_str("AND"),
            Condition::Or => f.write_str("OR"),
        }
    }
}

/// Leaf predicate: `field operator value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    pub id: NodeId,
    pub field: FieldId,
    pub operator: Operator,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

impl FilterRule {
    /// A rule participates in evaluation and compilation only when its operator needs no value or the value is
    /// non-blank.
    pub fn is_active(&self) -> bool {
        !self.operator.takes_value() || self.value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    pub fn value_str(&self) -> &str { self.value.as_deref().unwrap_or_default() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub id: NodeId,
    pub condition: Condition,
    #[serde(default)]
    pub rules: Vec<FilterNode>,
}

/// A tree node. The `type` discriminant is always written and required on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterNode {
    Rule(FilterRule),
    Group(FilterGroup),
}

impl FilterNode {
    pub fn id(&self) -> &NodeId {
        match self {
            FilterNode::Rule(rule) => &rule.id,
            FilterNode::Group(group) => &group.id,
        }
    }
}

impl From<FilterRule> for FilterNode {
    fn from(rule: FilterRule) -> Self { FilterNode::Rule(rule) }
}

impl From<FilterGroup> for FilterNode {
    fn from(group: FilterGroup) -> Self { FilterNode::Group(group) }
}

impl FilterGroup {
    pub fn new(id: impl Into<NodeId>, condition: Condition) -> Self { Self { id: id.into(), condition, rules: Vec::new() } }

    pub fn is_empty(&self) -> bool { self.rules.is_empty() }

    /// Number of rules anywhere in the tree.
    pub fn rule_count(&self) -> usize {
        self.rules
            .iter()
            .map(|node| match node {
                FilterNode::Rule(_) => 1,
                FilterNode::Group(group) => group.rule_count(),
            })
            .sum()
    }

    /// Nesting depth; a group without subgroups has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .rules
            .iter()
            .filter_map(|node| match node {
                FilterNode::Group(group) => Some(group.depth()),
                FilterNode::Rule(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Depth check that stops descending as soon as the limit is crossed.
    pub fn exceeds_depth(&self, max: usize) -> bool { exceeds(self, 1, max) }

    pub fn find(&self, id: &NodeId) -> Option<&FilterNode> {
        for node in &self.rules {
            if node.id() == id {
                return Some(node);
            }
            if let FilterNode::Group(group) = node {
                if let Some(found) = group.find(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Every node id in the tree, root first.
    pub fn node_ids(&self) -> Vec<&NodeId> {
        let mut ids = vec![&self.id];
        for node in &self.rules {
            match node {
                FilterNode::Rule(rule) => ids.push(&rule.id),
                FilterNode::Group(group) => ids.extend(group.node_ids()),
            }
        }
        ids
    }

    pub fn rules_iter(&self) -> impl Iterator<Item = &FilterRule> {
        let mut out = Vec::new();
        collect_rules(self, &mut out);
        out.into_iter()
    }
}

fn exceeds(group: &FilterGroup, level: usize, max: usize) -> bool {
    if level > max {
        return true;
    }
    group.rules.iter().any(|node| match node {
        FilterNode::Group(child) => exceeds(child, level + 1, max),
        FilterNode::Rule(_) => false,
    })
}

fn collect_rules<'a>(group: &'a FilterGroup, out: &mut Vec<&'a FilterRule>) {
    for node in &group.rules {
        match node {
            FilterNode::Rule(rule) => out.push(rule),
            FilterNode::Group(child) => collect_rules(child, out),
        }
    }
}
