//! Pure tree-building operations.
//!
//! Every operation takes a group by reference and returns a new group; the input is never touched. Operations
//! that create nodes need an id source and a default field, so they live on [`TreeBuilder`]. Operations that only
//! rearrange existing nodes are inherent methods on [`FilterGroup`].
//!
//! [`FilterGroup::remove_node`] only looks at direct children. To remove a node deeper in the tree, rebuild its
//! parent and put it back with [`FilterGroup::update_group`]:
//!
//! ```
//! # use filterql::builder::{TreeBuilder, SequentialIds};
//! # use filterql::ast::FilterNode;
//! # use filterql::catalog::FilterCatalog;
//! # use std::sync::Arc;
//! let builder = TreeBuilder::new(FilterCatalog::builtin()).with_ids(Arc::new(SequentialIds::default()));
//! let root = builder.root();
//! let root = builder.add_group(&root);
//! let FilterNode::Group(parent) = &root.rules[0] else { unreachable!() };
//! let parent = builder.add_rule(parent, None);
//! let rule_id = parent.rules[0].id().clone();
//!
//! let root = root.update_group(&parent.id, parent.remove_node(&rule_id));
//! assert_eq!(root.rule_count(), 0);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::ast::{Condition, FilterGroup, FilterNode, FilterRule, NodeId};
use crate::catalog::{FieldCatalog, FieldId, FieldType, FilterCatalog, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Rule,
    Group,
}

impl NodeKind {
    fn prefix(&self) -> &'static str {
        match self {
            NodeKind::Rule => "rule",
            NodeKind::Group => "group",
        }
    }
}

/// Source of node ids. Implementations must never hand out the same id twice.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, kind: NodeKind) -> NodeId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self, kind: NodeKind) -> NodeId { NodeId::new(format!("{}-{}", kind.prefix(), Uuid::new_v4())) }
}

/// Monotonic counter, for deterministic ids in tests and replays.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn starting_at(start: u64) -> Self { Self { next: AtomicU64::new(start) } }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, kind: NodeKind) -> NodeId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        NodeId::new(format!("{}-{}", kind.prefix(), n))
    }
}

/// Chooses the field for a rule added without an explicit one.
pub trait DefaultField: Send + Sync {
    fn default_field(&self, fields: &FieldCatalog) -> Option<FieldId>;
}

/// The first registered field.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstField;

impl DefaultField for FirstField {
    fn default_field(&self, fields: &FieldCatalog) -> Option<FieldId> { fields.first().map(|f| f.id.clone()) }
}

/// Always the same field, falling back to the first one if it is not registered.
#[derive(Debug, Clone)]
pub struct FixedField(pub FieldId);

impl DefaultField for FixedField {
    fn default_field(&self, fields: &FieldCatalog) -> Option<FieldId> {
        match fields.get(&self.0) {
            Some(field) => Some(field.id.clone()),
            None => FirstField.default_field(fields),
        }
    }
}

impl<F> DefaultField for F
where F: Fn(&FieldCatalog) -> Option<FieldId> + Send + Sync
{
    fn default_field(&self, fields: &FieldCatalog) -> Option<FieldId> { self(fields) }
}

#[derive(Clone)]
pub struct TreeBuilder {
    catalog: Arc<FilterCatalog>,
    ids: Arc<dyn IdGenerator>,
    default_field: Arc<dyn DefaultField>,
}

impl fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_struct("TreeBuilder").field("fields", &self.catalog.fields().len()).finish() }
}

impl TreeBuilder {
    pub fn new(catalog: Arc<FilterCatalog>) -> Self { Self { catalog, ids: Arc::new(UuidIds), default_field: Arc::new(FirstField) } }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_default_field(mut self, default_field: Arc<dyn DefaultField>) -> Self {
        self.default_field = default_field;
        self
    }

    pub fn catalog(&self) -> &Arc<FilterCatalog> { &self.catalog }

    /// A fresh, empty AND root.
    pub fn root(&self) -> FilterGroup { FilterGroup::new(self.ids.next_id(NodeKind::Group), Condition::And) }

    /// A rule on `field` (or the default field) with the field type's first operator and an empty value.
    pub fn new_rule(&self, field: Option<&FieldId>) -> Option<FilterRule> {
        let field_id = match field {
            Some(id) => id.clone(),
            None => self.default_field.default_field(self.catalog.fields())?,
        };
        let (operator, field_name) = self.defaults_for(&field_id);
        Some(FilterRule { id: self.ids.next_id(NodeKind::Rule), field: field_id, operator, value: Some(String::new()), field_name })
    }

    /// Appends a default rule. With an empty catalog and no explicit field there is nothing to build a rule from,
    /// and the group comes back unchanged.
    #[must_use]
    pub fn add_rule(&self, group: &FilterGroup, field: Option<&FieldId>) -> FilterGroup {
        let mut next = group.clone();
        match self.new_rule(field) {
            Some(rule) => next.rules.push(FilterNode::Rule(rule)),
            None => warn!("no default field available, rule not added to group {}", group.id),
        }
        next
    }

    /// Appends an empty AND group.
    #[must_use]
    pub fn add_group(&self, group: &FilterGroup) -> FilterGroup {
        let mut next = group.clone();
        next.rules.push(FilterNode::Group(FilterGroup::new(self.ids.next_id(NodeKind::Group), Condition::And)));
        next
    }

    /// Points a rule at another field, resetting operator and value.
    #[must_use]
    pub fn set_rule_field(&self, rule: &FilterRule, field: &FieldId) -> FilterRule {
        let (operator, field_name) = self.defaults_for(field);
        FilterRule { id: rule.id.clone(), field: field.clone(), operator, value: None, field_name }
    }

    /// Changes a rule's operator, clearing the value.
    #[must_use]
    pub fn set_rule_operator(&self, rule: &FilterRule, operator: Operator) -> FilterRule {
        FilterRule { operator, value: None, ..rule.clone() }
    }

    fn defaults_for(&self, field: &FieldId) -> (Operator, Option<String>) {
        match self.catalog.field(field) {
            Some(f) => (self.catalog.operators().default_operator(f.field_type), Some(f.name.clone())),
            None => (self.catalog.operators().default_operator(FieldType::Text), None),
        }
    }
}

impl FilterGroup {
    /// Replaces the rule with `id`, wherever it sits. Unknown ids leave the tree as it was.
    #[must_use]
    pub fn update_rule(&self, id: &NodeId, rule: FilterRule) -> FilterGroup {
        self.map_nodes(&mut |node| match node {
            FilterNode::Rule(existing) if &existing.id == id => Some(FilterNode::Rule(rule.clone())),
            _ => None,
        })
    }

    /// Replaces the group with `id`, including the root itself. Unknown ids leave the tree as it was.
    #[must_use]
    pub fn update_group(&self, id: &NodeId, group: FilterGroup) -> FilterGroup {
        if &self.id == id {
            return group;
        }
        self.map_nodes(&mut |node| match node {
            FilterNode::Group(existing) if &existing.id == id => Some(FilterNode::Group(group.clone())),
            _ => None,
        })
    }

    /// Drops the direct child with `id`. Grandchildren are not searched.
    #[must_use]
    pub fn remove_node(&self, id: &NodeId) -> FilterGroup {
        FilterGroup { id: self.id.clone(), condition: self.condition, rules: self.rules.iter().filter(|node| node.id() != id).cloned().collect() }
    }

    /// Flips AND/OR on this group only.
    #[must_use]
    pub fn toggle_condition(&self) -> FilterGroup { FilterGroup { condition: self.condition.flipped(), ..self.clone() } }

    /// Rebuilds the tree, replacing the first node (in pre-order) for which `replace` returns a value.
    fn map_nodes(&self, replace: &mut dyn FnMut(&FilterNode) -> Option<FilterNode>) -> FilterGroup {
        let mut replaced = false;
        self.map_inner(replace, &mut replaced)
    }

    fn map_inner(&self, replace: &mut dyn FnMut(&FilterNode) -> Option<FilterNode>, replaced: &mut bool) -> FilterGroup {
        let rules = self
            .rules
            .iter()
            .map(|node| {
                if *replaced {
                    return node.clone();
                }
                if let Some(new_node) = replace(node) {
                    *replaced = true;
                    return new_node;
                }
                match node {
                    FilterNode::Group(group) => FilterNode::Group(group.map_inner(replace, replaced)),
                    FilterNode::Rule(_) => node.clone(),
                }
            })
            .collect();
        FilterGroup { id: self.id.clone(), condition: self.condition, rules }
    }
}
