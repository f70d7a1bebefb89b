//! `saved_filters` on SQLite.

pub mod connection;
pub mod engine;
pub mod error;

pub use connection::{SqliteConfig, SqliteConnectionManager};
pub use engine::SqliteFilterStore;
pub use error::SqliteError;
