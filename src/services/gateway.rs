//! Execution offload gateway
//!
//! Query calls are serialized to JSON and sent to a background worker that
//! owns its own runtime and store connection. Responses are matched back to
//! callers by id through a pending table. The worker is started lazily, at
//! most once; if it cannot be started every call runs in-process, and a
//! failed round trip re-runs that one call in-process. Both fallbacks are
//! reported as `Outcome::Degraded`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use crate::db::IndexStore;
use crate::models::{
    DegradeReason, Entry, Outcome, QueryRequest, QueryResponse, TypeFilter, WorkerRequest, WorkerResponse,
};
use crate::services::metrics::{GATEWAY_CALLS_TOTAL, GATEWAY_FALLBACKS_TOTAL};
use crate::services::query_engine::{QueryEngine, QueryError};

/// Both ends of a worker connection, seen from the gateway
pub struct WorkerChannels {
    pub requests: mpsc::UnboundedSender<String>,
    pub responses: mpsc::UnboundedReceiver<String>,
}

/// Starts a background worker that answers `WorkerRequest` JSON with
/// `WorkerResponse` JSON
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, store_path: Option<PathBuf>, max_connections: u32) -> std::io::Result<WorkerChannels>;
}

/// Runs the worker on a dedicated OS thread with a current-thread runtime
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadWorkerSpawner;

#[async_trait]
impl WorkerSpawner for ThreadWorkerSpawner {
    async fn spawn(&self, store_path: Option<PathBuf>, max_connections: u32) -> std::io::Result<WorkerChannels> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        // The worker reports whether its runtime came up before serving
        let (ready_tx, ready_rx) = oneshot::channel::<std::io::Result<()>>();

        std::thread::Builder::new()
            .name("query-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let store = Arc::new(IndexStore::new(store_path, max_connections));
                runtime.block_on(run_worker(store, request_rx, response_tx));
            })?;

        ready_rx
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "query worker exited during startup"))??;

        Ok(WorkerChannels {
            requests: request_tx,
            responses: response_rx,
        })
    }
}

/// Worker loop: one request at a time until the gateway hangs up
pub async fn run_worker(
    store: Arc<IndexStore>,
    mut requests: mpsc::UnboundedReceiver<String>,
    responses: mpsc::UnboundedSender<String>,
) {
    info!("Query worker started");
    let engine = QueryEngine::new(store.clone());

    while let Some(text) = requests.recv().await {
        let response = match WorkerRequest::decode(&text) {
            Ok(request) => {
                debug!(id = request.id, op = request.request.operation_name(), "Worker request");
                match engine.execute(&request.request).await {
                    Ok(outcome) => WorkerResponse::success(request.id, outcome.value()),
                    Err(e) => WorkerResponse::failure(request.id, e.to_string()),
                }
            }
            Err(e) => match request_id(&text) {
                Some(id) => WorkerResponse::failure(id, format!("invalid request: {}", e)),
                None => {
                    warn!("Dropping worker request without an id: {}", e);
                    continue;
                }
            },
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => match serde_json::to_string(&WorkerResponse::failure(response.id, e.to_string())) {
                Ok(encoded) => encoded,
                Err(_) => continue,
            },
        };

        if responses.send(encoded).is_err() {
            break;
        }
    }

    store.close().await;
    info!("Query worker stopped");
}

fn request_id(text: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("id")?
        .as_u64()
}

/// Waiters keyed by request id
#[derive(Default)]
struct PendingTable {
    waiters: HashMap<u64, oneshot::Sender<WorkerResponse>>,
    /// Set once the worker's response channel has closed
    closed: bool,
}

/// Live connection to a started worker
struct WorkerHandle {
    requests: mpsc::UnboundedSender<String>,
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicU64,
}

impl WorkerHandle {
    fn start(channels: WorkerChannels) -> Self {
        let pending = Arc::new(Mutex::new(PendingTable::default()));
        tokio::spawn(dispatch_responses(channels.responses, pending.clone()));

        Self {
            requests: channels.requests,
            pending,
            next_id: AtomicU64::new(1),
        }
    }

    async fn round_trip(&self, request: &QueryRequest) -> Result<Outcome<QueryResponse>, QueryError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = WorkerRequest {
            id,
            request: request.clone(),
        }
        .encode()?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(QueryError::Worker("worker has stopped".to_string()));
            }
            pending.waiters.insert(id, tx);
        }

        if self.requests.send(text).is_err() {
            self.pending.lock().await.waiters.remove(&id);
            return Err(QueryError::Worker("worker request channel closed".to_string()));
        }

        let response = rx
            .await
            .map_err(|_| QueryError::Worker("worker stopped before responding".to_string()))?;

        if !response.ok {
            return Err(QueryError::Worker(
                response.error.unwrap_or_else(|| "unknown worker error".to_string()),
            ));
        }

        Ok(match response.result {
            Some(result) => Outcome::Ok(result),
            None => Outcome::Unavailable,
        })
    }
}

/// Route worker responses to their waiters; on hang-up, fail all waiters
async fn dispatch_responses(mut responses: mpsc::UnboundedReceiver<String>, pending: Arc<Mutex<PendingTable>>) {
    while let Some(text) = responses.recv().await {
        let response: WorkerResponse = match serde_json::from_str(&text) {
            Ok(response) => response,
            Err(e) => {
                warn!("Discarding malformed worker response: {}", e);
                continue;
            }
        };

        let waiter = pending.lock().await.waiters.remove(&response.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => debug!(id = response.id, "Worker response with no waiter"),
        }
    }

    let mut pending = pending.lock().await;
    pending.closed = true;
    let dropped = pending.waiters.len();
    pending.waiters.clear();
    if dropped > 0 {
        warn!(dropped, "Query worker hung up with calls in flight");
    }
}

pub struct OffloadGateway {
    engine: QueryEngine,
    store_path: Option<PathBuf>,
    max_connections: u32,
    enabled: bool,
    spawner: Arc<dyn WorkerSpawner>,
    worker: OnceCell<Result<WorkerHandle, String>>,
}

impl OffloadGateway {
    /// `enabled = false` always executes in-process
    pub fn new(store: Arc<IndexStore>, max_connections: u32, enabled: bool, spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self {
            store_path: store.path().map(|p| p.to_path_buf()),
            engine: QueryEngine::new(store),
            max_connections,
            enabled,
            spawner,
            worker: OnceCell::new(),
        }
    }

    /// Default gateway using a worker thread
    pub fn with_thread_worker(store: Arc<IndexStore>, max_connections: u32, enabled: bool) -> Self {
        Self::new(store, max_connections, enabled, Arc::new(ThreadWorkerSpawner))
    }

    async fn worker(&self) -> &Result<WorkerHandle, String> {
        self.worker
            .get_or_init(|| async {
                match self.spawner.spawn(self.store_path.clone(), self.max_connections).await {
                    Ok(channels) => {
                        info!("Query worker spawned");
                        Ok(WorkerHandle::start(channels))
                    }
                    Err(e) => {
                        error!("Failed to start query worker, executing queries in-process: {}", e);
                        Err(e.to_string())
                    }
                }
            })
            .await
    }

    /// Execute one request, offloaded when possible
    pub async fn execute(&self, request: QueryRequest) -> Result<Outcome<QueryResponse>, QueryError> {
        GATEWAY_CALLS_TOTAL
            .with_label_values(&[request.operation_name()])
            .inc();

        if !self.enabled {
            return self.engine.execute(&request).await;
        }

        match self.worker().await {
            Ok(handle) => match handle.round_trip(&request).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    warn!(op = request.operation_name(), error = %e, "Worker round trip failed, executing in-process");
                    GATEWAY_FALLBACKS_TOTAL.with_label_values(&["round_trip"]).inc();
                    let outcome = self.engine.execute(&request).await?;
                    Ok(outcome.degrade(DegradeReason::RoundTripFailed(e.to_string())))
                }
            },
            Err(reason) => {
                GATEWAY_FALLBACKS_TOTAL.with_label_values(&["worker_unavailable"]).inc();
                let outcome = self.engine.execute(&request).await?;
                Ok(outcome.degrade(DegradeReason::WorkerUnavailable(reason.clone())))
            }
        }
    }

    pub async fn search_by_title(&self, query: &str, limit: usize) -> Result<Outcome<Vec<Entry>>, QueryError> {
        let request = QueryRequest::SearchTitle {
            query: query.to_string(),
            limit,
        };
        Ok(self.execute(request).await?.map(QueryResponse::into_entries))
    }

    pub async fn search_by_group_title(&self, query: &str, limit: usize) -> Result<Outcome<Vec<Entry>>, QueryError> {
        let request = QueryRequest::SearchGroup {
            query: query.to_string(),
            limit,
        };
        Ok(self.execute(request).await?.map(QueryResponse::into_entries))
    }

    pub async fn get_all(&self) -> Result<Outcome<Vec<Entry>>, QueryError> {
        Ok(self.execute(QueryRequest::GetAll).await?.map(QueryResponse::into_entries))
    }

    pub async fn get_all_groups(&self) -> Result<Outcome<Vec<String>>, QueryError> {
        Ok(self.execute(QueryRequest::GetAllGroups).await?.map(QueryResponse::into_groups))
    }

    pub async fn get_all_paged(
        &self,
        offset: usize,
        limit: usize,
        filter: TypeFilter,
        groups: Vec<String>,
    ) -> Result<Outcome<Vec<Entry>>, QueryError> {
        let request = QueryRequest::GetAllPaged {
            offset,
            limit,
            filter,
            groups,
        };
        Ok(self.execute(request).await?.map(QueryResponse::into_entries))
    }

    pub async fn search_by_title_paged(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
        filter: TypeFilter,
        groups: Vec<String>,
    ) -> Result<Outcome<Vec<Entry>>, QueryError> {
        let request = QueryRequest::SearchTitlePaged {
            query: query.to_string(),
            offset,
            limit,
            filter,
            groups,
        };
        Ok(self.execute(request).await?.map(QueryResponse::into_entries))
    }

    pub async fn get_groups(&self, filter: TypeFilter) -> Result<Outcome<Vec<String>>, QueryError> {
        Ok(self
            .execute(QueryRequest::GetGroups { filter })
            .await?
            .map(QueryResponse::into_groups))
    }

    pub async fn get_by_title(&self, title: &str) -> Result<Outcome<Option<Entry>>, QueryError> {
        let request = QueryRequest::GetByTitle {
            title: title.to_string(),
        };
        Ok(self.execute(request).await?.map(QueryResponse::into_entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovieType;
    use std::sync::atomic::AtomicUsize;

    struct FailingSpawner {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl WorkerSpawner for FailingSpawner {
        async fn spawn(&self, _: Option<PathBuf>, _: u32) -> std::io::Result<WorkerChannels> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no threads left"))
        }
    }

    /// Worker that rejects every request
    struct RejectingSpawner;

    #[async_trait]
    impl WorkerSpawner for RejectingSpawner {
        async fn spawn(&self, _: Option<PathBuf>, _: u32) -> std::io::Result<WorkerChannels> {
            let (request_tx, mut request_rx) = mpsc::unbounded_channel::<String>();
            let (response_tx, response_rx) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Some(text) = request_rx.recv().await {
                    let id = request_id(&text).unwrap_or_default();
                    let reply = serde_json::to_string(&WorkerResponse::failure(id, "boom")).unwrap();
                    let _ = response_tx.send(reply);
                }
            });
            Ok(WorkerChannels {
                requests: request_tx,
                responses: response_rx,
            })
        }
    }

    /// Worker that exits without answering
    struct HangUpSpawner;

    #[async_trait]
    impl WorkerSpawner for HangUpSpawner {
        async fn spawn(&self, _: Option<PathBuf>, _: u32) -> std::io::Result<WorkerChannels> {
            let (request_tx, request_rx) = mpsc::unbounded_channel::<String>();
            let (_, response_rx) = mpsc::unbounded_channel();
            drop(request_rx);
            Ok(WorkerChannels {
                requests: request_tx,
                responses: response_rx,
            })
        }
    }

    async fn seeded_store() -> (tempfile::TempDir, Arc<IndexStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IndexStore::new(Some(dir.path().join("gateway.db")), 2));
        let entries = vec![
            Entry {
                title: "Show Name".to_string(),
                group_title: "DIZI".to_string(),
                movie_type: Some(MovieType::TvSeries),
                ..Default::default()
            },
            Entry {
                title: "Other Film".to_string(),
                url: "http://h/f.mp4".to_string(),
                group_title: "FILM".to_string(),
                movie_type: Some(MovieType::Film),
                ..Default::default()
            },
        ];
        store.bulk_upsert(&entries).await.unwrap();
        (dir, store)
    }

    fn titles(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_thread_worker_answers_queries() {
        let (_dir, store) = seeded_store().await;
        let gateway = OffloadGateway::with_thread_worker(store, 2, true);

        let found = gateway.search_by_title("show", 10).await.unwrap();
        assert!(!found.is_degraded());
        assert_eq!(titles(&found.into_inner()), vec!["Show Name"]);

        let groups = gateway.get_all_groups().await.unwrap();
        assert_eq!(groups, Outcome::Ok(vec!["DIZI".to_string(), "FILM".to_string()]));

        let detail = gateway.get_by_title("Other Film").await.unwrap().into_inner();
        assert_eq!(detail.map(|e| e.url), Some("http://h/f.mp4".to_string()));
    }

    #[tokio::test]
    async fn test_completed_calls_leave_no_waiters() {
        let (_dir, store) = seeded_store().await;
        let gateway = OffloadGateway::with_thread_worker(store, 2, true);

        for _ in 0..20 {
            let outcome = gateway.search_by_title("film", 10).await.unwrap();
            assert!(!outcome.is_degraded());
            assert_eq!(titles(&outcome.into_inner()), vec!["Other Film"]);
        }

        let handle = match gateway.worker.get() {
            Some(Ok(handle)) => handle,
            _ => panic!("worker was not started"),
        };
        assert!(handle.pending.lock().await.waiters.is_empty());
        assert_eq!(handle.next_id.load(Ordering::SeqCst), 21);
    }

    #[tokio::test]
    async fn test_spawn_failure_falls_back_for_every_call() {
        let (_dir, store) = seeded_store().await;
        let spawner = Arc::new(FailingSpawner {
            attempts: AtomicUsize::new(0),
        });
        let gateway = OffloadGateway::new(store, 2, true, spawner.clone());

        let first = gateway.search_by_title("show", 10).await.unwrap();
        assert!(matches!(first.degrade_reason(), Some(DegradeReason::WorkerUnavailable(_))));
        assert_eq!(titles(&first.into_inner()), vec!["Show Name"]);

        let second = gateway
            .get_all_paged(0, 10, TypeFilter::Film, Vec::new())
            .await
            .unwrap();
        assert!(second.is_degraded());
        assert_eq!(titles(&second.into_inner()), vec!["Other Film"]);

        assert_eq!(spawner.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_round_trip_reruns_in_process() {
        let (_dir, store) = seeded_store().await;
        let gateway = OffloadGateway::new(store, 2, true, Arc::new(RejectingSpawner));

        let outcome = gateway.search_by_group_title("diz", 10).await.unwrap();
        assert_eq!(
            outcome.degrade_reason(),
            Some(&DegradeReason::RoundTripFailed("worker error: boom".to_string()))
        );
        assert_eq!(titles(&outcome.into_inner()), vec!["Show Name"]);
    }

    #[tokio::test]
    async fn test_worker_hang_up_degrades() {
        let (_dir, store) = seeded_store().await;
        let gateway = OffloadGateway::new(store, 2, true, Arc::new(HangUpSpawner));

        for _ in 0..2 {
            let outcome = gateway.get_all().await.unwrap();
            assert!(outcome.is_degraded());
            assert_eq!(outcome.into_inner().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_disabled_offload_runs_directly() {
        let (_dir, store) = seeded_store().await;
        let spawner = Arc::new(FailingSpawner {
            attempts: AtomicUsize::new(0),
        });
        let gateway = OffloadGateway::new(store, 2, false, spawner.clone());

        let outcome = gateway.get_groups(TypeFilter::TvSeries).await.unwrap();
        assert_eq!(outcome, Outcome::Ok(vec!["DIZI".to_string()]));
        assert_eq!(spawner.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_through_worker() {
        let store = Arc::new(IndexStore::new(None, 1));
        let gateway = OffloadGateway::with_thread_worker(store, 1, true);

        let outcome = gateway.search_by_title("x", 5).await.unwrap();
        assert!(outcome.is_unavailable());
    }
}
