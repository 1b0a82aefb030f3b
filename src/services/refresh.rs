//! Playlist refresh: fetch -> parse -> classify -> bulk upsert.
//!
//! Only one refresh runs at a time; a concurrent call is rejected rather
//! than queued.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{IndexStore, StoreError};
use crate::models::Demotion;
use crate::services::classifier::EntryClassifier;
use crate::services::m3u_parser::{parse_m3u, PlaylistSource, SourceError};
use crate::services::metrics::{REFRESHES_TOTAL, UPSERTED_ENTRIES_TOTAL};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("a refresh is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one completed refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub run_id: Uuid,
    pub source: String,
    pub raw_items: usize,
    pub streams: usize,
    pub movies: usize,
    pub series: usize,
    pub written: usize,
    pub skipped: usize,
    pub demotions: Vec<Demotion>,
    pub elapsed_ms: u64,
    pub refreshed_at: DateTime<Utc>,
}

/// Clears the in-progress flag when the refresh ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct RefreshService {
    source: Arc<dyn PlaylistSource>,
    store: Arc<IndexStore>,
    in_progress: AtomicBool,
    last: RwLock<Option<RefreshSummary>>,
    last_error: RwLock<Option<String>>,
}

impl RefreshService {
    pub fn new(source: Arc<dyn PlaylistSource>, store: Arc<IndexStore>) -> Self {
        Self {
            source,
            store,
            in_progress: AtomicBool::new(false),
            last: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub async fn last_summary(&self) -> Option<RefreshSummary> {
        self.last.read().await.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    pub async fn refresh(&self) -> Result<RefreshSummary, RefreshError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            REFRESHES_TOTAL.with_label_values(&["already_running"]).inc();
            return Err(RefreshError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.in_progress);

        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, source = %self.source.describe(), "Playlist refresh started");

        match self.run(run_id).await {
            Ok(summary) => {
                REFRESHES_TOTAL.with_label_values(&["success"]).inc();
                tracing::info!(
                    %run_id,
                    written = summary.written,
                    streams = summary.streams,
                    movies = summary.movies,
                    series = summary.series,
                    demoted = summary.demotions.len(),
                    elapsed_ms = summary.elapsed_ms,
                    "Playlist refresh completed"
                );
                *self.last.write().await = Some(summary.clone());
                *self.last_error.write().await = None;
                Ok(summary)
            }
            Err(e) => {
                REFRESHES_TOTAL.with_label_values(&["failure"]).inc();
                tracing::error!(%run_id, error = %e, "Playlist refresh failed");
                *self.last_error.write().await = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn run(&self, run_id: Uuid) -> Result<RefreshSummary, RefreshError> {
        let start = Instant::now();

        let content = self.source.fetch().await?;
        let items = parse_m3u(&content)?;
        let raw_items = items.len();

        let classified = EntryClassifier::classify_and_aggregate(&items);
        let streams = classified.streams.len();
        let movies = classified.movies.len();
        let series = classified.series_count();
        let demotions = classified.demotions.clone();

        let report = self.store.bulk_upsert(&classified.into_entries()).await?;
        UPSERTED_ENTRIES_TOTAL.inc_by(report.written as u64);

        Ok(RefreshSummary {
            run_id,
            source: self.source.describe(),
            raw_items,
            streams,
            movies,
            series,
            written: report.written,
            skipped: report.skipped,
            demotions,
            elapsed_ms: start.elapsed().as_millis() as u64,
            refreshed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::m3u_parser::StaticPlaylistSource;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    const PLAYLIST: &str = "#EXTM3U\n\
        #EXTINF:-1 tvg-logo=\"http://logo/1.png\" group-title=\"TR: NEWS 1\",Channel One\n\
        http://h/live/1\n\
        #EXTINF:-1 group-title=\"TR: DIZI 3\",Show.Name.S02E05\n\
        http://h/series/1.mkv\n\
        #EXTINF:-1 group-title=\"TR: DIZI 3\",Show Name S02E06\n\
        http://h/series/2.mkv\n\
        #EXTINF:-1 group-title=\"TR: DIZI\",Finale Special\n\
        http://h/series/x.mp4\n\
        #EXTINF:-1 group-title=\"TR: FILM\",Some Film\n\
        http://h/film.mp4\n";

    /// Source that blocks until released
    struct GatedSource {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl PlaylistSource for GatedSource {
        async fn fetch(&self) -> Result<String, SourceError> {
            self.gate.notified().await;
            Ok(PLAYLIST.to_string())
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    fn temp_store() -> (tempfile::TempDir, Arc<IndexStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IndexStore::new(Some(dir.path().join("refresh.db")), 2));
        (dir, store)
    }

    #[tokio::test]
    async fn test_refresh_classifies_and_stores() {
        let (_dir, store) = temp_store();
        let service = RefreshService::new(Arc::new(StaticPlaylistSource::new(PLAYLIST)), store.clone());

        let summary = service.refresh().await.unwrap();
        assert_eq!(summary.raw_items, 5);
        assert_eq!(summary.streams, 1);
        // Some Film, demoted Finale Special, Show Name
        assert_eq!(summary.movies, 3);
        assert_eq!(summary.series, 1);
        assert_eq!(summary.written, 4);
        assert_eq!(summary.demotions.len(), 1);
        assert_eq!(summary.demotions[0].title, "Finale Special");

        let series = store.get_by_title("Show Name").await.unwrap().unwrap();
        assert_eq!(series.episode_count(), 2);
        assert_eq!(series.group_title, "DIZI");

        let channel = store.get_by_title("Channel One").await.unwrap().unwrap();
        assert!(channel.movie_type.is_none());
        assert_eq!(channel.group_title, "NEWS");

        assert!(service.last_summary().await.is_some());
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_rejected() {
        let (_dir, store) = temp_store();
        let gate = Arc::new(Notify::new());
        let service = Arc::new(RefreshService::new(
            Arc::new(GatedSource { gate: gate.clone() }),
            store,
        ));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.refresh().await })
        };
        while !service.is_running() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(service.refresh().await, Err(RefreshError::AlreadyRunning)));

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_failed_refresh_records_error() {
        let (_dir, store) = temp_store();
        let service = RefreshService::new(Arc::new(StaticPlaylistSource::new("not a playlist")), store);

        assert!(matches!(
            service.refresh().await,
            Err(RefreshError::Source(SourceError::MissingHeader))
        ));
        assert!(service.last_error().await.is_some());
        assert!(!service.is_running());
    }
}
