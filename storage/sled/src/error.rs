use filtra_core::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SledError {
    #[error("Storage error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<SledError> for StorageError {
    fn from(err: SledError) -> Self { StorageError::backend(err) }
}
