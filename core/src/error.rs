use thiserror::Error;

use filterql::error::DecodeError;

/// Rejected before any backend call is made.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("filter name must not be blank")]
    BlankName,
    #[error("filter has no rules")]
    EmptyFilter,
    #[error("a saved filter named {0:?} already exists")]
    DuplicateName(String),
    #[error("filter tree exceeds the maximum depth of {max}")]
    DepthExceeded { max: usize },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("filter data could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StorageError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self { StorageError::Backend(Box::new(err)) }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// Storage failures may succeed on a later attempt; validation failures will not.
    pub fn is_retryable(&self) -> bool { matches!(self, ServiceError::Storage(_)) }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("filter session is closed")]
    Closed,
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("saved filter could not be read: {0}")]
    Decode(#[from] DecodeError),
}
