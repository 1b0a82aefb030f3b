//! Playlist entries repository
//!
//! Bulk upsert runs inside one transaction. Reads are either point lookups
//! or lazy ordered scans that callers may drop at any time.

use futures::stream::BoxStream;
use sqlx::SqlitePool;

use crate::db::models::EntryRow;

const SELECT_COLUMNS: &str = "SELECT title, url, group_title, group_title_raw, logo, movie_type, \
     seasons, title_lower, group_title_lower FROM playlist";

/// Index a scan walks, ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// Primary key
    Title,
    /// `playlist_title_lower`, ties by title
    TitleLower,
    /// `playlist_group_title_lower`, ties by title
    GroupTitleLower,
}

impl ScanOrder {
    fn sql(self) -> &'static str {
        match self {
            ScanOrder::Title => concat!(
                "SELECT title, url, group_title, group_title_raw, logo, movie_type, ",
                "seasons, title_lower, group_title_lower FROM playlist ",
                "ORDER BY title"
            ),
            ScanOrder::TitleLower => concat!(
                "SELECT title, url, group_title, group_title_raw, logo, movie_type, ",
                "seasons, title_lower, group_title_lower FROM playlist ",
                "ORDER BY title_lower, title"
            ),
            ScanOrder::GroupTitleLower => concat!(
                "SELECT title, url, group_title, group_title_raw, logo, movie_type, ",
                "seasons, title_lower, group_title_lower FROM playlist ",
                "ORDER BY group_title_lower, title"
            ),
        }
    }
}

/// Insert-or-replace every row in a single transaction.
/// Any failure rolls back the whole batch.
pub async fn bulk_upsert(pool: &SqlitePool, rows: &[EntryRow]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut written = 0u64;

    for row in rows {
        let result = sqlx::query(
            r#"
            INSERT INTO playlist (title, url, group_title, group_title_raw, logo, movie_type,
                                  seasons, title_lower, group_title_lower)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(title) DO UPDATE SET
                url = excluded.url,
                group_title = excluded.group_title,
                group_title_raw = excluded.group_title_raw,
                logo = excluded.logo,
                movie_type = excluded.movie_type,
                seasons = excluded.seasons,
                title_lower = excluded.title_lower,
                group_title_lower = excluded.group_title_lower
            "#,
        )
        .bind(&row.title)
        .bind(&row.url)
        .bind(&row.group_title)
        .bind(&row.group_title_raw)
        .bind(&row.logo)
        .bind(&row.movie_type)
        .bind(&row.seasons)
        .bind(&row.title_lower)
        .bind(&row.group_title_lower)
        .execute(&mut *tx)
        .await?;

        written += result.rows_affected();
    }

    // Dropping `tx` on an early return above rolls back
    tx.commit().await?;

    Ok(written)
}

/// Find a row by its exact title
pub async fn find_by_title(pool: &SqlitePool, title: &str) -> Result<Option<EntryRow>, sqlx::Error> {
    let sql = format!("{} WHERE title = ?1", SELECT_COLUMNS);
    sqlx::query_as::<_, EntryRow>(&sql)
        .bind(title)
        .fetch_optional(pool)
        .await
}

/// Find the first row (by title) whose lower-cased title matches
pub async fn find_by_title_lower(
    pool: &SqlitePool,
    title_lower: &str,
) -> Result<Option<EntryRow>, sqlx::Error> {
    let sql = format!("{} WHERE title_lower = ?1 ORDER BY title LIMIT 1", SELECT_COLUMNS);
    sqlx::query_as::<_, EntryRow>(&sql)
        .bind(title_lower)
        .fetch_optional(pool)
        .await
}

/// Lazy ascending scan over one index
pub fn scan(pool: &SqlitePool, order: ScanOrder) -> BoxStream<'_, Result<EntryRow, sqlx::Error>> {
    sqlx::query_as::<_, EntryRow>(order.sql()).fetch(pool)
}

/// Number of stored rows
pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM playlist")
        .fetch_one(pool)
        .await
}
