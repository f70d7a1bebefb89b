use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use filtra_core::{FilterDomain, OwnerId, SavedFilterId, SavedFilterRecord, SavedFilterStorage, StorageError};
use rusqlite::{params, Connection, Row};
use tracing::{debug, warn};

use crate::connection::{SqliteConfig, SqliteConnectionManager};
use crate::error::SqliteError;

pub const DEFAULT_POOL_SIZE: u32 = 10;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "saved_filters"(
    "id" TEXT PRIMARY KEY,
    "name" TEXT NOT NULL,
    "filter_data" TEXT NOT NULL,
    "user_id" TEXT NOT NULL,
    "filter_type" TEXT NOT NULL,
    "created_at" INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS "saved_filters_owner" ON "saved_filters"("user_id", "filter_type");
"#;

pub struct SqliteFilterStore {
    pool: bb8::Pool<SqliteConnectionManager>,
}

impl SqliteFilterStore {
    /// Uses an existing pool. The table must already exist; see [`SqliteFilterStore::connect`].
    pub fn new(pool: bb8::Pool<SqliteConnectionManager>) -> Self { Self { pool } }

    pub async fn connect(config: SqliteConfig) -> anyhow::Result<Self> {
        // a private in-memory database exists only on its one connection
        let size = match config {
            SqliteConfig::Memory => 1,
            SqliteConfig::File(_) => DEFAULT_POOL_SIZE,
        };
        let pool = bb8::Pool::builder().max_size(size).build(SqliteConnectionManager::new(config)).await?;
        let store = Self::new(pool);
        store.pool.get().await?.with_connection(|c| c.execute_batch(CREATE_TABLE).map_err(SqliteError::from)).await?;
        Ok(store)
    }

    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> { Self::connect(SqliteConfig::File(path.as_ref().to_path_buf())).await }

    pub async fn open_in_memory() -> anyhow::Result<Self> { Self::connect(SqliteConfig::Memory).await }

    pub fn pool(&self) -> &bb8::Pool<SqliteConnectionManager> { &self.pool }

    async fn run<F, T>(&self, f: F) -> Result<T, SqliteError>
    where
        F: FnOnce(&Connection) -> Result<T, SqliteError> + Send + 'static,
        T: Send + 'static,
    {
        self.pool.get().await?.with_connection(f).await
    }
}

/// Reads one row. Rows that are not valid saved filters come back as `Ok(None)`.
fn decode_row(row: &Row<'_>) -> rusqlite::Result<Option<SavedFilterRecord>> {
    let id: String = row.get("id")?;
    let domain: String = row.get("filter_type")?;
    let micros: i64 = row.get("created_at")?;
    let (Ok(parsed_id), Ok(domain), Some(created_at)) = (id.parse::<SavedFilterId>(), domain.parse::<FilterDomain>(), DateTime::from_timestamp_micros(micros)) else {
        warn!("skipping malformed saved_filters row {id}");
        return Ok(None);
    };
    Ok(Some(SavedFilterRecord {
        id: parsed_id,
        name: row.get("name")?,
        filter_data: row.get("filter_data")?,
        owner: OwnerId::new(row.get::<_, String>("user_id")?),
        domain,
        created_at,
    }))
}

#[async_trait]
impl SavedFilterStorage for SqliteFilterStore {
    async fn insert(&self, record: SavedFilterRecord) -> Result<(), StorageError> {
        debug!("SqliteFilterStore.insert {}", record.id);
        self.run(move |c| {
            c.execute(
                r#"INSERT OR REPLACE INTO "saved_filters"("id", "name", "filter_data", "user_id", "filter_type", "created_at") VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    record.id.to_string(),
                    record.name,
                    record.filter_data,
                    record.owner.as_str(),
                    record.domain.as_str(),
                    record.created_at.timestamp_micros()
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn list(&self, owner: &OwnerId, domain: FilterDomain) -> Result<Vec<SavedFilterRecord>, StorageError> {
        let owner = owner.clone();
        let records = self
            .run(move |c| {
                let mut stmt = c.prepare(
                    r#"SELECT "id", "name", "filter_data", "user_id", "filter_type", "created_at" FROM "saved_filters"
                       WHERE "user_id" = ?1 AND "filter_type" = ?2 ORDER BY "created_at" DESC, "id" DESC"#,
                )?;
                let rows = stmt.query_map(params![owner.as_str(), domain.as_str()], decode_row)?;
                let mut records = Vec::new();
                for row in rows {
                    records.extend(row?);
                }
                Ok(records)
            })
            .await?;
        Ok(records)
    }

    async fn delete(&self, id: SavedFilterId) -> Result<bool, StorageError> {
        let removed = self.run(move |c| Ok(c.execute(r#"DELETE FROM "saved_filters" WHERE "id" = ?1"#, params![id.to_string()])?)).await?;
        Ok(removed > 0)
    }
}
