//! Record store backends for the annotation service.
//!
//! - [`JsonlStore`]: a JSONL (or JSON-array) file with a backup taken before
//!   every write.
//! - [`SqliteStore`]: a single `annotations` table accessed through sqlx.
//!
//! Both implement [`annotator_core::store::RecordStore`].

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub mod error;
pub mod files;
pub mod jsonl_store;
pub mod models;
pub mod repositories;
pub mod sqlite_store;
pub mod transfer;

pub use error::DbError;
pub use jsonl_store::JsonlStore;
pub use sqlite_store::SqliteStore;

pub type DbPool = sqlx::SqlitePool;

/// Create a connection pool, creating the database file if needed.
pub async fn create_pool(database_url: &str) -> Result<DbPool, DbError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Connect, migrate and wrap the pool in a [`SqliteStore`].
pub async fn open_sqlite_store(database_url: &str) -> Result<SqliteStore, DbError> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;
    tracing::info!("SQLite record store ready");
    Ok(SqliteStore::new(pool))
}
