//! `saved_filters` on Sled.

pub mod error;
pub mod store;

pub use error::SledError;
pub use store::SledFilterStore;
