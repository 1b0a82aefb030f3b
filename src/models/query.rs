//! Query protocol shared by the direct query engine and the background worker.
//!
//! Requests and responses cross the worker boundary as JSON text, so every
//! type here is plain serializable data.

use serde::{Deserialize, Serialize};

use super::playlist::{Entry, TypeFilter};

/// One query operation with its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum QueryRequest {
    SearchTitle {
        query: String,
        limit: usize,
    },
    SearchGroup {
        query: String,
        limit: usize,
    },
    GetAll,
    GetAllGroups,
    #[serde(rename_all = "camelCase")]
    GetAllPaged {
        offset: usize,
        limit: usize,
        filter: TypeFilter,
        groups: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    SearchTitlePaged {
        query: String,
        offset: usize,
        limit: usize,
        filter: TypeFilter,
        groups: Vec<String>,
    },
    GetGroups {
        filter: TypeFilter,
    },
    GetByTitle {
        title: String,
    },
}

impl QueryRequest {
    pub fn operation_name(&self) -> &'static str {
        match self {
            QueryRequest::SearchTitle { .. } => "searchTitle",
            QueryRequest::SearchGroup { .. } => "searchGroup",
            QueryRequest::GetAll => "getAll",
            QueryRequest::GetAllGroups => "getAllGroups",
            QueryRequest::GetAllPaged { .. } => "getAllPaged",
            QueryRequest::SearchTitlePaged { .. } => "searchTitlePaged",
            QueryRequest::GetGroups { .. } => "getGroups",
            QueryRequest::GetByTitle { .. } => "getByTitle",
        }
    }
}

/// Result of a query operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum QueryResponse {
    Entries(Vec<Entry>),
    Groups(Vec<String>),
    Entry(Option<Entry>),
}

impl QueryResponse {
    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            QueryResponse::Entries(entries) => entries,
            QueryResponse::Entry(entry) => entry.into_iter().collect(),
            QueryResponse::Groups(_) => Vec::new(),
        }
    }

    pub fn into_groups(self) -> Vec<String> {
        match self {
            QueryResponse::Groups(groups) => groups,
            _ => Vec::new(),
        }
    }

    pub fn into_entry(self) -> Option<Entry> {
        match self {
            QueryResponse::Entry(entry) => entry,
            QueryResponse::Entries(entries) => entries.into_iter().next(),
            QueryResponse::Groups(_) => None,
        }
    }
}

/// Request envelope sent to the worker: `{id, type, payload}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub id: u64,
    pub request: QueryRequest,
}

impl WorkerRequest {
    /// Encode as a single flat JSON object
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(&self.request)?;
        if let serde_json::Value::Object(ref mut map) = value {
            map.insert("id".to_string(), serde_json::Value::from(self.id));
        }
        serde_json::to_string(&value)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        let id = value
            .as_object_mut()
            .and_then(|map| map.remove("id"))
            .and_then(|id| id.as_u64())
            .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("id"))?;
        let request = serde_json::from_value(value)?;
        Ok(Self { id, request })
    }
}

/// Response envelope sent back by the worker: `{id, ok, result | error}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    /// `result: None` reports an unavailable store
    pub fn success(id: u64, result: Option<QueryResponse>) -> Self {
        Self {
            id,
            ok: true,
            result,
            error: None,
        }
    }

    pub fn failure(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}
