pub mod config;
pub mod debounce;
pub mod error;
pub mod projection;
pub mod saved;
pub mod service;
pub mod session;
pub mod state;
pub mod storage;
pub mod summary;

pub use config::SessionConfig;
pub use error::{ServiceError, SessionError, StorageError, ValidationError};
pub use projection::QueryProjection;
pub use saved::{FilterDomain, OwnerId, SavedFilter, SavedFilterId, SavedFilterRecord};
pub use service::FilterPersistenceService;
pub use session::{LocalFilter, SavedFilters, UnifiedFilterSession, WeakFilterSession};
pub use state::{CustomFieldFilter, FilterState, LastContact};
pub use storage::{MemoryStorage, SavedFilterStorage};

pub use filterql;
