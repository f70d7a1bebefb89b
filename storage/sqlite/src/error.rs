use filtra_core::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl From<SqliteError> for StorageError {
    fn from(err: SqliteError) -> Self { StorageError::backend(err) }
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for SqliteError {
    fn from(err: bb8::RunError<E>) -> Self { SqliteError::Pool(err.to_string()) }
}
