//! Database connection pool management

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Additive schema; every statement must be safe to re-run
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS playlist (
        title TEXT NOT NULL PRIMARY KEY,
        url TEXT NOT NULL DEFAULT '',
        group_title TEXT NOT NULL DEFAULT '',
        group_title_raw TEXT NOT NULL DEFAULT '',
        logo TEXT NOT NULL DEFAULT '',
        movie_type TEXT,
        seasons TEXT,
        title_lower TEXT NOT NULL DEFAULT '',
        group_title_lower TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS playlist_title_idx ON playlist (title)",
    "CREATE INDEX IF NOT EXISTS playlist_title_lower ON playlist (title_lower, title)",
    "CREATE INDEX IF NOT EXISTS playlist_group_title ON playlist (group_title)",
    "CREATE INDEX IF NOT EXISTS playlist_group_title_lower ON playlist (group_title_lower, title)",
];

/// Create a SQLite connection pool, creating the file and its parent
/// directory when missing
pub async fn create_pool(path: &Path, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    info!("Opening SQLite store at {}...", path.display());

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(options)
        .await?;

    info!("SQLite connection pool created with max {} connections", max_connections.max(1));

    Ok(pool)
}

/// Create tables and indexes if missing, then record the schema version
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");

    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("Database migrations completed (schema version {})", SCHEMA_VERSION);

    Ok(())
}

/// Stored schema version
pub async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("PRAGMA user_version").fetch_one(pool).await
}

/// Health check for the database
pub async fn health_check(pool: &SqlitePool) -> bool {
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => true,
        Err(e) => {
            error!("Database health check failed: {}", e);
            false
        }
    }
}
