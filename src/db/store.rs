//! Index store lifecycle
//!
//! `IndexStore` owns the SQLite pool. It opens lazily on first use; a missing
//! path or a failed open leaves it permanently unavailable, and `close()`
//! moves it to the same state. Callers treat unavailable as an empty store.

use futures::stream::{BoxStream, StreamExt};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::db::models::EntryRow;
use crate::db::pool::{create_pool, health_check, run_migrations, schema_version};
use crate::db::repository::{entries, ScanOrder};
use crate::models::Entry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("index store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result of a bulk upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertReport {
    pub written: usize,
    /// Non-object payloads and entries without a title
    pub skipped: usize,
}

enum StoreState {
    Unopened,
    Open(SqlitePool),
    Unavailable(String),
    Closed,
}

pub struct IndexStore {
    path: Option<PathBuf>,
    max_connections: u32,
    state: RwLock<StoreState>,
}

impl IndexStore {
    /// A store backed by `path`; `None` means no persistence is available
    pub fn new(path: Option<PathBuf>, max_connections: u32) -> Self {
        Self {
            path,
            max_connections,
            state: RwLock::new(StoreState::Unopened),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read handle over the open pool, opening it on first use
    pub async fn reader(&self) -> Result<StoreReader, StoreError> {
        {
            let state = self.state.read().await;
            if !matches!(*state, StoreState::Unopened) {
                return Self::reader_for(&state);
            }
        }

        let mut state = self.state.write().await;
        if matches!(*state, StoreState::Unopened) {
            *state = self.open_state().await;
        }
        Self::reader_for(&state)
    }

    fn reader_for(state: &StoreState) -> Result<StoreReader, StoreError> {
        match state {
            StoreState::Open(pool) => Ok(StoreReader { pool: pool.clone() }),
            StoreState::Unavailable(reason) => Err(StoreError::Unavailable(reason.clone())),
            StoreState::Closed => Err(StoreError::Unavailable("store closed".to_string())),
            StoreState::Unopened => Err(StoreError::Unavailable("store not opened".to_string())),
        }
    }

    async fn open_state(&self) -> StoreState {
        let Some(path) = self.path.as_deref() else {
            info!("No store path configured, index store disabled");
            return StoreState::Unavailable("no store path configured".to_string());
        };

        let opened = async {
            let pool = create_pool(path, self.max_connections).await?;
            run_migrations(&pool).await?;
            Ok::<_, sqlx::Error>(pool)
        }
        .await;

        match opened {
            Ok(pool) => StoreState::Open(pool),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open index store");
                StoreState::Unavailable(e.to_string())
            }
        }
    }

    /// Whether the store is (or can be) opened
    pub async fn is_available(&self) -> bool {
        self.reader().await.is_ok()
    }

    /// Release all connections; the store reports unavailable afterwards
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if let StoreState::Open(pool) = &*state {
            pool.close().await;
            info!("Index store closed");
        }
        *state = StoreState::Closed;
    }

    /// Insert or replace entries by title in one transaction.
    /// Entries with an empty title are skipped.
    pub async fn bulk_upsert(&self, batch: &[Entry]) -> Result<UpsertReport, StoreError> {
        let reader = self.reader().await?;

        let mut rows = Vec::with_capacity(batch.len());
        let mut skipped = 0;
        for entry in batch {
            if entry.title.is_empty() {
                skipped += 1;
                continue;
            }
            rows.push(EntryRow::from_entry(entry)?);
        }

        entries::bulk_upsert(&reader.pool, &rows).await?;

        if skipped > 0 {
            debug!(skipped, "Skipped entries without a title");
        }
        info!(written = rows.len(), skipped, "Bulk upsert committed");

        Ok(UpsertReport {
            written: rows.len(),
            skipped,
        })
    }

    /// Upsert loosely-typed values; anything that is not an object with a
    /// usable shape is skipped
    pub async fn bulk_upsert_values(
        &self,
        values: Vec<serde_json::Value>,
    ) -> Result<UpsertReport, StoreError> {
        let total = values.len();
        let batch: Vec<Entry> = values
            .into_iter()
            .filter(|value| value.is_object())
            .filter_map(|value| match serde_json::from_value::<Entry>(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping malformed entry");
                    None
                }
            })
            .collect();

        let rejected = total - batch.len();
        let mut report = self.bulk_upsert(&batch).await?;
        report.skipped += rejected;
        Ok(report)
    }

    pub async fn get_by_title(&self, title: &str) -> Result<Option<Entry>, StoreError> {
        self.reader().await?.get_by_title(title).await
    }

    pub async fn get_by_title_lower(&self, title_lower: &str) -> Result<Option<Entry>, StoreError> {
        self.reader().await?.get_by_title_lower(title_lower).await
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.reader().await?.count().await
    }

    /// Open and answering queries
    pub async fn ping(&self) -> bool {
        match self.reader().await {
            Ok(reader) => reader.ping().await,
            Err(_) => false,
        }
    }

    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        self.reader().await?.schema_version().await
    }
}

/// Cheap read handle; clones share the underlying pool
#[derive(Clone)]
pub struct StoreReader {
    pool: SqlitePool,
}

impl StoreReader {
    pub async fn get_by_title(&self, title: &str) -> Result<Option<Entry>, StoreError> {
        match entries::find_by_title(&self.pool, title).await? {
            Some(row) => Ok(Some(row.into_entry()?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_title_lower(&self, title_lower: &str) -> Result<Option<Entry>, StoreError> {
        match entries::find_by_title_lower(&self.pool, title_lower).await? {
            Some(row) => Ok(Some(row.into_entry()?)),
            None => Ok(None),
        }
    }

    /// Lazy ascending scan; dropping the stream ends the cursor
    pub fn scan(&self, order: ScanOrder) -> BoxStream<'_, Result<Entry, StoreError>> {
        entries::scan(&self.pool, order)
            .map(|row| -> Result<Entry, StoreError> { Ok(row?.into_entry()?) })
            .boxed()
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(entries::count(&self.pool).await?.max(0) as usize)
    }

    /// Round trip to the database
    pub async fn ping(&self) -> bool {
        health_check(&self.pool).await
    }

    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(schema_version(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovieType, Season};
    use futures::TryStreamExt;

    fn temp_store() -> (tempfile::TempDir, IndexStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(Some(dir.path().join("index.db")), 2);
        (dir, store)
    }

    fn series_entry() -> Entry {
        let episode = Entry {
            title: "Show.Name.S02E05.mkv".to_string(),
            url: "http://h/series/1.mkv".to_string(),
            group_title: "DIZI".to_string(),
            group_title_raw: "TR: DIZI 3".to_string(),
            logo: "http://logo/x.png".to_string(),
            movie_type: Some(MovieType::TvSeries),
            seasons: None,
        };
        Entry {
            title: "Show Name".to_string(),
            url: String::new(),
            group_title: "DIZI".to_string(),
            group_title_raw: "TR: DIZI 3".to_string(),
            logo: "http://logo/x.png".to_string(),
            movie_type: Some(MovieType::TvSeries),
            seasons: Some(vec![Season {
                number: "02".to_string(),
                episodes: vec![episode],
            }]),
        }
    }

    #[tokio::test]
    async fn test_missing_path_is_unavailable() {
        let store = IndexStore::new(None, 1);
        assert!(!store.is_available().await);
        assert!(store.count().await.unwrap_err().is_unavailable());
        assert!(store.bulk_upsert(&[series_entry()]).await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_upsert_round_trips_logical_fields() {
        let (_dir, store) = temp_store();
        let entry = series_entry();

        let report = store.bulk_upsert(&[entry.clone()]).await.unwrap();
        assert_eq!(report, UpsertReport { written: 1, skipped: 0 });

        assert_eq!(store.get_by_title("Show Name").await.unwrap(), Some(entry.clone()));
        assert_eq!(store.get_by_title_lower("show name").await.unwrap(), Some(entry));
        assert_eq!(store.get_by_title("show name").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_values_skips_malformed() {
        let (_dir, store) = temp_store();
        let values = vec![
            serde_json::json!({"title": "Channel 1", "url": "http://h/live/1"}),
            serde_json::json!("not an object"),
            serde_json::json!(42),
            serde_json::json!({"url": "http://h/untitled"}),
            serde_json::json!({"title": ["bad"]}),
        ];

        let report = store.bulk_upsert_values(values).await.unwrap();
        assert_eq!(report, UpsertReport { written: 1, skipped: 4 });
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rows_missing_from_new_batch_are_kept() {
        let (_dir, store) = temp_store();
        let entry = |t: &str| Entry {
            title: t.to_string(),
            ..Default::default()
        };

        store.bulk_upsert(&[entry("Old"), entry("Both")]).await.unwrap();
        store.bulk_upsert(&[entry("Both"), entry("New")]).await.unwrap();

        let titles: Vec<String> = store
            .reader()
            .await
            .unwrap()
            .scan(ScanOrder::Title)
            .map_ok(|e| e.title)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(titles, vec!["Both", "New", "Old"]);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_whole_batch() {
        let (_dir, store) = temp_store();
        let reader = store.reader().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON playlist WHEN NEW.title = 'Bad' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&reader.pool)
        .await
        .unwrap();

        let entry = |t: &str| Entry {
            title: t.to_string(),
            ..Default::default()
        };
        let result = store.bulk_upsert(&[entry("First"), entry("Bad"), entry("Last")]).await;

        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.get_by_title("First").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_makes_store_unavailable() {
        let (_dir, store) = temp_store();
        assert!(store.is_available().await);
        assert!(store.ping().await);
        assert_eq!(store.schema_version().await.unwrap(), 1);

        store.close().await;
        assert!(!store.ping().await);
        assert!(!store.is_available().await);
        assert!(store.get_by_title("x").await.unwrap_err().is_unavailable());
    }
}
