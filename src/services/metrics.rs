//! Prometheus counters, registered in the default registry and exposed
//! by `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

lazy_static! {
    /// Playlist refresh runs by outcome (`success`, `failure`, `already_running`)
    pub static ref REFRESHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "playlist_refreshes_total",
        "Total number of playlist refresh runs",
        &["status"]
    )
    .expect("Failed to register playlist_refreshes_total");

    /// Entries written by bulk upserts
    pub static ref UPSERTED_ENTRIES_TOTAL: IntCounter = register_int_counter!(
        "playlist_upserted_entries_total",
        "Total number of entries written to the index store"
    )
    .expect("Failed to register playlist_upserted_entries_total");

    /// Query calls through the offload gateway, by operation
    pub static ref GATEWAY_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "query_gateway_calls_total",
        "Total number of query calls through the offload gateway",
        &["operation"]
    )
    .expect("Failed to register query_gateway_calls_total");

    /// Calls that fell back to direct execution, by reason
    pub static ref GATEWAY_FALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "query_gateway_fallbacks_total",
        "Total number of query calls executed directly after an offload failure",
        &["reason"]
    )
    .expect("Failed to register query_gateway_fallbacks_total");
}
