//! Filter expression trees over contact records.
//!
//! A filter is a [`FilterGroup`](ast::FilterGroup): an AND/OR group of rules and nested groups. Trees are built
//! and edited through the pure operations in [`builder`], evaluated locally by
//! [`Evaluator`](selection::filter::Evaluator) and compiled for the remote backend by
//! [`PredicateCompiler`](selection::predicate::PredicateCompiler). Both interpret a tree the same way.

pub mod ast;
pub mod builder;
pub mod catalog;
pub mod collation;
pub mod conversion;
pub mod error;

pub mod selection {
    pub mod filter;
    pub mod predicate;
    pub mod search;
}

pub use ast::{Condition, FilterGroup, FilterNode, FilterRule, NodeId, DEFAULT_MAX_DEPTH};
pub use builder::TreeBuilder;
pub use catalog::{FieldCatalog, FieldId, FieldType, FilterCatalog, FilterableField, Operator, OperatorCatalog};
pub use selection::filter::{Evaluator, Filterable};
pub use selection::predicate::{CompiledFilter, PredicateCompiler, RemotePredicate};
