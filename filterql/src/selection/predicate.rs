//! Compile filter trees into the remote backend's `column.operator.value` predicate grammar.
//!
//! The backend's plain filter list is a single comma-joined OR. That cannot express a tree, so the compiler
//! targets the extended logic-tree form of the same grammar: `and(...)` and `or(...)` nest freely, and a clause
//! is negated as `column.not.operator.value`. A group's condition is always carried through; AND is never
//! rewritten as OR. The only reshaping done is what leaves the meaning intact: single-child groups collapse,
//! nested groups of the same kind merge, and groups that end up empty disappear.
//!
//! Rules that cannot be compiled (unknown field, operator not offered for the field type, blank or malformed
//! value) are dropped from their group and reported in [`CompiledFilter::skipped`].

use std::fmt::{self, Write as _};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::ast::{Condition, FilterGroup, FilterNode, FilterRule, NodeId, DEFAULT_MAX_DEPTH};
use crate::catalog::{FieldId, FieldType, FilterCatalog, FilterableField, Operator};
use crate::collation::{self, DateValue};
use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    ILike,
    Is,
    In,
    /// Array contains all of.
    Cs,
    /// Array overlaps with.
    Ov,
}

impl RemoteOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOperator::Eq => "eq",
            RemoteOperator::Neq => "neq",
            RemoteOperator::Gt => "gt",
            RemoteOperator::Gte => "gte",
            RemoteOperator::Lt => "lt",
            RemoteOperator::Lte => "lte",
            RemoteOperator::ILike => "ilike",
            RemoteOperator::Is => "is",
            RemoteOperator::In => "in",
            RemoteOperator::Cs => "cs",
            RemoteOperator::Ov => "ov",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Literal(String),
    /// Already escaped LIKE pattern.
    Pattern(String),
    Null,
    /// `(a,b)` for `in`.
    List(Vec<String>),
    /// `{a,b}` for array operators.
    Array(Vec<String>),
}

impl fmt::Display for RemoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteValue::Literal(s) | RemoteValue::Pattern(s) => f.write_str(&quote(s)),
            RemoteValue::Null => f.write_str("null"),
            RemoteValue::List(items) => write!(f, "({})", items.iter().map(|s| quote(s)).collect::<Vec<_>>().join(",")),
            RemoteValue::Array(items) => write!(f, "{{{}}}", items.iter().map(|s| quote(s)).collect::<Vec<_>>().join(",")),
        }
    }
}

/// Double-quotes values containing characters the grammar reserves.
fn quote(value: &str) -> String {
    let reserved = value.is_empty() || value.trim() != value || value.chars().any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\' | '{' | '}'));
    if !reserved {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Escapes LIKE metacharacters so user text matches literally.
pub fn like_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub column: String,
    pub negated: bool,
    pub operator: RemoteOperator,
    pub value: RemoteValue,
}

impl Clause {
    pub fn new(column: impl Into<String>, operator: RemoteOperator, value: RemoteValue) -> Self {
        Self { column: column.into(), negated: false, operator, value }
    }

    pub fn negated(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// The part after `column=` when the clause is sent as its own query parameter.
    pub fn param_value(&self) -> String {
        let mut out = String::new();
        if self.negated {
            out.push_str("not.");
        }
        let _ = write!(out, "{}.{}", self.operator.as_str(), self.value);
        out
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}.{}", self.column, self.param_value()) }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemotePredicate {
    Clause(Clause),
    And(Vec<RemotePredicate>),
    Or(Vec<RemotePredicate>),
}

impl From<Clause> for RemotePredicate {
    fn from(clause: Clause) -> Self { RemotePredicate::Clause(clause) }
}

impl RemotePredicate {
    /// Conjunction of the given parts; `None` if there are none.
    pub fn all(parts: Vec<RemotePredicate>) -> Option<RemotePredicate> { Self::combine(Condition::And, parts) }

    /// Disjunction of the given parts; `None` if there are none.
    pub fn any(parts: Vec<RemotePredicate>) -> Option<RemotePredicate> { Self::combine(Condition::Or, parts) }

    fn combine(condition: Condition, parts: Vec<RemotePredicate>) -> Option<RemotePredicate> {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match (condition, part) {
                (Condition::And, RemotePredicate::And(inner)) | (Condition::Or, RemotePredicate::Or(inner)) => flat.extend(inner),
                (_, part) => flat.push(part),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(match condition {
                Condition::And => RemotePredicate::And(flat),
                Condition::Or => RemotePredicate::Or(flat),
            }),
        }
    }

    /// The flat comma-joined OR list, available only when the predicate is exactly a single clause or a single
    /// level OR of clauses.
    pub fn as_or_list(&self) -> Option<String> {
        match self {
            RemotePredicate::Clause(clause) => Some(clause.to_string()),
            RemotePredicate::Or(children) => children
                .iter()
                .map(|child| match child {
                    RemotePredicate::Clause(clause) => Some(clause.to_string()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(|clauses| clauses.join(",")),
            RemotePredicate::And(_) => None,
        }
    }

    /// Query parameters whose conjunction is this predicate.
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        match self {
            RemotePredicate::Clause(clause) => vec![(clause.column.clone(), clause.param_value())],
            RemotePredicate::Or(children) => vec![("or".to_string(), format!("({})", join(children)))],
            RemotePredicate::And(children) => {
                let (clauses, trees): (Vec<_>, Vec<_>) = children.iter().partition(|c| matches!(c, RemotePredicate::Clause(_)));
                let mut params: Vec<(String, String)> = clauses.into_iter().flat_map(|c| c.to_query_params()).collect();
                match trees.as_slice() {
                    [] => {}
                    [single] => params.extend(single.to_query_params()),
                    many => params.push(("and".to_string(), format!("({})", many.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(",")))),
                }
                params
            }
        }
    }
}

fn join(children: &[RemotePredicate]) -> String { children.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",") }

impl fmt::Display for RemotePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemotePredicate::Clause(clause) => write!(f, "{clause}"),
            RemotePredicate::And(children) => write!(f, "and({})", join(children)),
            RemotePredicate::Or(children) => write!(f, "or({})", join(children)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    UnknownField,
    UnsupportedOperator { operator: Operator, field_type: FieldType },
    MissingValue,
    MalformedValue(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownField => f.write_str("unknown field"),
            SkipReason::UnsupportedOperator { operator, field_type } => write!(f, "operator {operator} is not offered for {field_type} fields"),
            SkipReason::MissingValue => f.write_str("no value"),
            SkipReason::MalformedValue(value) => write!(f, "malformed value {value:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRule {
    pub rule: NodeId,
    pub field: FieldId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFilter {
    /// `None` when nothing in the tree constrains the result.
    pub predicate: Option<RemotePredicate>,
    pub skipped: Vec<SkippedRule>,
}

impl CompiledFilter {
    pub fn is_unconstrained(&self) -> bool { self.predicate.is_none() }
}

/// What a group compiles to. A vacuous group has no active rules and matches everything; a dropped one lost
/// all of its rules to skips.
enum GroupOutcome {
    Constrained(RemotePredicate),
    Vacuous,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct PredicateCompiler<'a> {
    catalog: &'a FilterCatalog,
    now: DateTime<Utc>,
    max_depth: usize,
}

impl<'a> PredicateCompiler<'a> {
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

    pub fn compile(&self, group: &FilterGroup) -> Result<CompiledFilter, CompileError> {
        if group.exceeds_depth(self.max_depth) {
            return Err(CompileError::DepthExceeded { max: self.max_depth });
        }
        let mut skipped = Vec::new();
        let predicate = self.compile_group(group, &mut skipped);
        debug!("compiled filter {} ({} skipped): {:?}", group.id, skipped.len(), predicate.as_ref().map(|p| p.to_string()));
        Ok(CompiledFilter { predicate, skipped })
    }

    fn compile_group(&self, group: &FilterGroup, skipped: &mut Vec<SkippedRule>) -> Option<RemotePredicate> {
        match self.compile_node(group, skipped) {
            GroupOutcome::Constrained(predicate) => Some(predicate),
            GroupOutcome::Vacuous | GroupOutcome::Dropped => None,
        }
    }

    fn compile_node(&self, group: &FilterGroup, skipped: &mut Vec<SkippedRule>) -> GroupOutcome {
        let mut parts = Vec::new();
        let mut vacuous_child = false;
        let mut dropped = false;
        for node in &group.rules {
            match node {
                FilterNode::Rule(rule) => match self.compile_rule(rule) {
                    Ok(predicate) => parts.push(predicate),
                    Err(reason) => {
                        match reason {
                            // inactive rules are ignored locally as well, so they do not count as dropped
                            SkipReason::MissingValue => debug!("rule {} has no value yet, skipped", rule.id),
                            _ => {
                                warn!("rule {} on {} skipped: {}", rule.id, rule.field, reason);
                                dropped = true;
                            }
                        }
                        skipped.push(SkippedRule { rule: rule.id.clone(), field: rule.field.clone(), reason });
                    }
                },
                FilterNode::Group(child) => match self.compile_node(child, skipped) {
                    GroupOutcome::Constrained(predicate) => parts.push(predicate),
                    GroupOutcome::Vacuous => vacuous_child = true,
                    GroupOutcome::Dropped => dropped = true,
                },
            }
        }
        // OR with an always-true member is always true
        if vacuous_child && group.condition == Condition::Or {
            return GroupOutcome::Vacuous;
        }
        match RemotePredicate::combine(group.condition, parts) {
            Some(predicate) => GroupOutcome::Constrained(predicate),
            None if dropped => GroupOutcome::Dropped,
            None => GroupOutcome::Vacuous,
        }
    }

    /// Compiles a single rule.
    pub fn compile_rule(&self, rule: &FilterRule) -> Result<RemotePredicate, SkipReason> {
        if !rule.is_active() {
            return Err(SkipReason::MissingValue);
        }
        let field = self.catalog.field(&rule.field).ok_or(SkipReason::UnknownField)?;
        if !self.catalog.operators().is_legal(field.field_type, rule.operator) {
            return Err(SkipReason::UnsupportedOperator { operator: rule.operator, field_type: field.field_type });
        }
        let column = field.remote_column();
        let value = rule.value_str().trim();

        match rule.operator {
            Operator::IsEmpty => return Ok(empty_check(field, column)),
            Operator::IsNotEmpty => return Ok(non_empty_check(field, column)),
            _ => {}
        }
        match field.field_type {
            FieldType::Text | FieldType::Select => text_clause(column, field.field_type, rule.operator, rule.value_str()),
            FieldType::Number => number_clause(column, rule.operator, value),
            FieldType::Date => self.date_clause(column, rule.operator, value),
            FieldType::Boolean => boolean_clause(column, rule.operator, value),
        }
    }

    fn date_clause(&self, column: String, operator: Operator, value: &str) -> Result<RemotePredicate, SkipReason> {
        let malformed = || SkipReason::MalformedValue(value.to_string());
        let clause = |op, at: DateTime<Utc>| RemotePredicate::Clause(Clause::new(column.clone(), op, RemoteValue::Literal(timestamp(at))));
        let window = |from: DateTime<Utc>, to: DateTime<Utc>| RemotePredicate::And(vec![clause(RemoteOperator::Gte, from), clause(RemoteOperator::Lte, to)]);

        match operator {
            Operator::LastDays => {
                let days = collation::parse_days(value).ok_or_else(malformed)?;
                Ok(window(self.now - Duration::days(days), self.now))
            }
            Operator::NextDays => {
                let days = collation::parse_days(value).ok_or_else(malformed)?;
                Ok(window(self.now, self.now + Duration::days(days)))
            }
            Operator::Between => {
                let (start, end) = collation::split_range(value).ok_or_else(malformed)?;
                let start = collation::parse_date(start).ok_or_else(malformed)?;
                let end = collation::parse_date(end).ok_or_else(malformed)?;
                Ok(RemotePredicate::And(vec![clause(RemoteOperator::Gte, start.instant), clause(RemoteOperator::Lt, end.end_exclusive())]))
            }
            _ => {
                let bound: DateValue = collation::parse_date(value).ok_or_else(malformed)?;
                Ok(match (operator, bound.date_only) {
                    (Operator::Equals, true) => RemotePredicate::And(vec![clause(RemoteOperator::Gte, bound.instant), clause(RemoteOperator::Lt, bound.end_exclusive())]),
                    (Operator::NotEquals, true) => RemotePredicate::Or(vec![clause(RemoteOperator::Lt, bound.instant), clause(RemoteOperator::Gte, bound.end_exclusive())]),
                    (Operator::Equals, false) => clause(RemoteOperator::Eq, bound.instant),
                    (Operator::NotEquals, false) => clause(RemoteOperator::Neq, bound.instant),
                    (Operator::Before, _) => clause(RemoteOperator::Lt, bound.instant),
                    (Operator::After, true) => clause(RemoteOperator::Gte, bound.end_exclusive()),
                    (Operator::After, false) => clause(RemoteOperator::Gt, bound.instant),
                    (operator, _) => return Err(SkipReason::UnsupportedOperator { operator, field_type: FieldType::Date }),
                })
            }
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String { at.to_rfc3339_opts(SecondsFormat::Secs, true) }

fn text_clause(column: String, field_type: FieldType, operator: Operator, value: &str) -> Result<RemotePredicate, SkipReason> {
    let pattern = |p: String| RemoteValue::Pattern(p);
    let clause = match operator {
        Operator::Equals => Clause::new(column, RemoteOperator::Eq, RemoteValue::Literal(value.to_string())),
        Operator::NotEquals => Clause::new(column, RemoteOperator::Neq, RemoteValue::Literal(value.to_string())),
        Operator::Contains => Clause::new(column, RemoteOperator::ILike, pattern(format!("%{}%", like_escape(value)))),
        Operator::NotContains => Clause::new(column, RemoteOperator::ILike, pattern(format!("%{}%", like_escape(value)))).negated(),
        Operator::StartsWith => Clause::new(column, RemoteOperator::ILike, pattern(format!("{}%", like_escape(value)))),
        Operator::EndsWith => Clause::new(column, RemoteOperator::ILike, pattern(format!("%{}", like_escape(value)))),
        Operator::In | Operator::NotIn => {
            let items: Vec<String> = collation::split_list(value).into_iter().map(str::to_string).collect();
            if items.is_empty() {
                return Err(SkipReason::MalformedValue(value.to_string()));
            }
            let clause = Clause::new(column, RemoteOperator::In, RemoteValue::List(items));
            if operator == Operator::NotIn {
                clause.negated()
            } else {
                clause
            }
        }
        operator => return Err(SkipReason::UnsupportedOperator { operator, field_type }),
    };
    Ok(clause.into())
}

fn number_clause(column: String, operator: Operator, value: &str) -> Result<RemotePredicate, SkipReason> {
    let malformed = || SkipReason::MalformedValue(value.to_string());
    let literal = |n: f64| RemoteValue::Literal(n.to_string());
    if operator == Operator::Between {
        let (low, high) = collation::split_range(value).ok_or_else(malformed)?;
        let low = collation::parse_number(low).ok_or_else(malformed)?;
        let high = collation::parse_number(high).ok_or_else(malformed)?;
        return Ok(RemotePredicate::And(vec![
            Clause::new(column.clone(), RemoteOperator::Gte, literal(low)).into(),
            Clause::new(column, RemoteOperator::Lte, literal(high)).into(),
        ]));
    }
    let n = collation::parse_number(value).ok_or_else(malformed)?;
    let op = match operator {
        Operator::Equals => RemoteOperator::Eq,
        Operator::NotEquals => RemoteOperator::Neq,
        Operator::Gt => RemoteOperator::Gt,
        Operator::Gte => RemoteOperator::Gte,
        Operator::Lt => RemoteOperator::Lt,
        Operator::Lte => RemoteOperator::Lte,
        operator => return Err(SkipReason::UnsupportedOperator { operator, field_type: FieldType::Number }),
    };
    Ok(Clause::new(column, op, literal(n)).into())
}

fn boolean_clause(column: String, operator: Operator, value: &str) -> Result<RemotePredicate, SkipReason> {
    let b = collation::parse_boolean(value).ok_or_else(|| SkipReason::MalformedValue(value.to_string()))?;
    let op = match operator {
        Operator::Equals => RemoteOperator::Eq,
        Operator::NotEquals => RemoteOperator::Neq,
        operator => return Err(SkipReason::UnsupportedOperator { operator, field_type: FieldType::Boolean }),
    };
    Ok(Clause::new(column, op, RemoteValue::Literal(b.to_string())).into())
}

/// Null, and for text-like fields also the empty string.
fn empty_check(field: &FilterableField, column: String) -> RemotePredicate {
    let is_null = Clause::new(column.clone(), RemoteOperator::Is, RemoteValue::Null);
    match field.field_type {
        FieldType::Text | FieldType::Select => {
            RemotePredicate::Or(vec![is_null.into(), Clause::new(column, RemoteOperator::Eq, RemoteValue::Literal(String::new())).into()])
        }
        _ => is_null.into(),
    }
}

fn non_empty_check(field: &FilterableField, column: String) -> RemotePredicate {
    let not_null = Clause::new(column.clone(), RemoteOperator::Is, RemoteValue::Null).negated();
    match field.field_type {
        FieldType::Text | FieldType::Select => {
            RemotePredicate::And(vec![not_null.into(), Clause::new(column, RemoteOperator::Neq, RemoteValue::Literal(String::new())).into()])
        }
        _ => not_null.into(),
    }
}
