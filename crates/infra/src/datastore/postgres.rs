//! Postgres-backed datastore.
//!
//! All collections share one table:
//!
//! ```sql
//! records(collection TEXT, id TEXT, data JSONB, PRIMARY KEY (collection, id))
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` (insert only) |
//! | Anything else | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::instrument;

use routeforge_core::{Datastore, StoreError};

const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresDatastore {
    pool: Arc<PgPool>,
}

impl PostgresDatastore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect with a small pool. Does not run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `records` table if it does not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl Datastore for PostgresDatastore {
    #[instrument(skip(self), err)]
    async fn exists(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM records WHERE collection = $1 AND id = $2)")
            .bind(collection)
            .bind(id)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists", e))?;
        row.try_get::<bool, _>(0)
            .map_err(|e| map_sqlx_error("exists", e))
    }

    #[instrument(skip(self), err)]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT data FROM records WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;
        row.map(|r| r.try_get::<Value, _>("data"))
            .transpose()
            .map_err(|e| map_sqlx_error("get", e))
    }

    #[instrument(skip(self, record), err)]
    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO records (collection, id, data) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id)
            .bind(record)
            .execute(&*self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(map_sqlx_error("insert", e)),
        }
    }

    #[instrument(skip(self, record), err)]
    async fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO records (collection, id, data) VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(record)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("put", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query("SELECT data FROM records WHERE collection = $1 ORDER BY id ASC")
            .bind(collection)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;
        rows.iter()
            .map(|r| r.try_get::<Value, _>("data"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list", e))
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected() > 0)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Backend(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
