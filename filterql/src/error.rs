use thiserror::Error;

use crate::ast::NodeId;
use crate::catalog::{FieldId, FieldType};

/// Raised while assembling the catalogs. These are startup failures, never filter-build failures.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("field type {0} has no registered operators")]
    NoOperators(FieldType),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("field {0} is already registered")]
    DuplicateField(FieldId),
    #[error("field id must not be blank")]
    BlankFieldId,
}

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("filter tree exceeds the maximum depth of {max}")]
    DepthExceeded { max: usize },
}

/// Hard compile failures. Per-rule problems are not errors: they are reported as
/// [`crate::selection::predicate::SkippedRule`]s and the rest of the tree still compiles.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("filter tree exceeds the maximum depth of {max}")]
    DepthExceeded { max: usize },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid filter json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("filter tree exceeds the maximum depth of {max}")]
    DepthExceeded { max: usize },
    #[error("node {0} is not a filter group")]
    NotAGroup(NodeId),
    #[error("malformed legacy node: {0}")]
    Legacy(String),
}

impl From<EvalError> for CompileError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::DepthExceeded { max } => CompileError::DepthExceeded { max },
        }
    }
}
