//! Read-side query algorithms over the index store.
//!
//! Every operation walks one ordered cursor and stops as soon as it has what
//! it needs. An unavailable store yields `Outcome::Unavailable`, never an error.

use deunicode::deunicode;
use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::db::store::{StoreError, StoreReader};
use crate::db::{IndexStore, ScanOrder};
use crate::models::{Entry, Outcome, QueryRequest, QueryResponse, TypeFilter};

pub const DEFAULT_TITLE_LIMIT: usize = 50;
pub const DEFAULT_GROUP_LIMIT: usize = 100;
pub const DEFAULT_PAGE_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// Filters shared by paged listing and paged search
#[derive(Debug, Clone)]
struct PageFilter<'a> {
    needle: Option<String>,
    type_filter: TypeFilter,
    groups: &'a [String],
}

impl PageFilter<'_> {
    fn accepts(&self, entry: &Entry) -> bool {
        if !self.type_filter.accepts(entry.movie_type) {
            return false;
        }
        if !self.groups.is_empty() && !self.groups.iter().any(|g| *g == entry.group_title) {
            return false;
        }
        match &self.needle {
            Some(needle) => entry.title.to_lowercase().contains(needle.as_str()),
            None => true,
        }
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<IndexStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    async fn reader(&self) -> Result<Option<StoreReader>, QueryError> {
        match self.store.reader().await {
            Ok(reader) => Ok(Some(reader)),
            Err(e) if e.is_unavailable() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Case-insensitive substring match on titles, in `titleLower` order
    pub async fn search_by_title(&self, query: &str, limit: usize) -> Result<Outcome<Vec<Entry>>, QueryError> {
        self.search_contains(query, limit, ScanOrder::TitleLower, |e| &e.title)
            .await
    }

    /// Case-insensitive substring match on refined group titles
    pub async fn search_by_group_title(&self, query: &str, limit: usize) -> Result<Outcome<Vec<Entry>>, QueryError> {
        self.search_contains(query, limit, ScanOrder::GroupTitleLower, |e| &e.group_title)
            .await
    }

    async fn search_contains<F>(
        &self,
        query: &str,
        limit: usize,
        order: ScanOrder,
        field: F,
    ) -> Result<Outcome<Vec<Entry>>, QueryError>
    where
        F: Fn(&Entry) -> &String,
    {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Outcome::Ok(Vec::new()));
        }

        let Some(reader) = self.reader().await? else {
            return Ok(Outcome::Unavailable);
        };

        let mut results = Vec::new();
        let mut rows = reader.scan(order);
        while let Some(entry) = rows.try_next().await? {
            if field(&entry).to_lowercase().contains(&needle) {
                results.push(entry);
                if results.len() >= limit {
                    break;
                }
            }
        }

        Ok(Outcome::Ok(results))
    }

    /// Every stored entry in primary-key order
    pub async fn get_all(&self) -> Result<Outcome<Vec<Entry>>, QueryError> {
        let Some(reader) = self.reader().await? else {
            return Ok(Outcome::Unavailable);
        };

        let entries = reader.scan(ScanOrder::Title).try_collect().await?;
        Ok(Outcome::Ok(entries))
    }

    /// Distinct non-empty group titles across all entries
    pub async fn get_all_groups(&self) -> Result<Outcome<Vec<String>>, QueryError> {
        self.get_groups(TypeFilter::All).await
    }

    /// Distinct non-empty group titles among entries passing the filter,
    /// sorted case-insensitively
    pub async fn get_groups(&self, filter: TypeFilter) -> Result<Outcome<Vec<String>>, QueryError> {
        let Some(reader) = self.reader().await? else {
            return Ok(Outcome::Unavailable);
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut rows = reader.scan(ScanOrder::Title);
        while let Some(entry) = rows.try_next().await? {
            if !filter.accepts(entry.movie_type) {
                continue;
            }
            let group = entry.group_title.trim();
            if !group.is_empty() && !seen.contains(group) {
                seen.insert(group.to_string());
            }
        }

        let mut groups: Vec<String> = seen.into_iter().collect();
        sort_groups(&mut groups);
        Ok(Outcome::Ok(groups))
    }

    /// Page through entries in `titleLower` order
    pub async fn get_all_paged(
        &self,
        offset: usize,
        limit: usize,
        type_filter: TypeFilter,
        groups: &[String],
    ) -> Result<Outcome<Vec<Entry>>, QueryError> {
        let filter = PageFilter {
            needle: None,
            type_filter,
            groups,
        };
        self.page(offset, limit, &filter).await
    }

    /// Paged title search; a blank query lists everything
    pub async fn search_by_title_paged(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
        type_filter: TypeFilter,
        groups: &[String],
    ) -> Result<Outcome<Vec<Entry>>, QueryError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.get_all_paged(offset, limit, type_filter, groups).await;
        }

        let filter = PageFilter {
            needle: Some(needle),
            type_filter,
            groups,
        };
        self.page(offset, limit, &filter).await
    }

    async fn page(&self, offset: usize, limit: usize, filter: &PageFilter<'_>) -> Result<Outcome<Vec<Entry>>, QueryError> {
        if limit == 0 {
            return Ok(Outcome::Ok(Vec::new()));
        }

        let Some(reader) = self.reader().await? else {
            return Ok(Outcome::Unavailable);
        };

        let mut skipped = 0;
        let mut page = Vec::new();
        let mut rows = reader.scan(ScanOrder::TitleLower);
        while let Some(entry) = rows.try_next().await? {
            if !filter.accepts(&entry) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            page.push(entry);
            if page.len() >= limit {
                break;
            }
        }

        Ok(Outcome::Ok(page))
    }

    /// Exact title lookup, falling back to a case-insensitive match
    pub async fn get_by_title(&self, title: &str) -> Result<Outcome<Option<Entry>>, QueryError> {
        let Some(reader) = self.reader().await? else {
            return Ok(Outcome::Unavailable);
        };

        if let Some(entry) = reader.get_by_title(title).await? {
            return Ok(Outcome::Ok(Some(entry)));
        }
        let entry = reader.get_by_title_lower(&title.to_lowercase()).await?;
        Ok(Outcome::Ok(entry))
    }

    /// Dispatch one protocol request
    pub async fn execute(&self, request: &QueryRequest) -> Result<Outcome<QueryResponse>, QueryError> {
        let outcome = match request {
            QueryRequest::SearchTitle { query, limit } => self
                .search_by_title(query, *limit)
                .await?
                .map(QueryResponse::Entries),
            QueryRequest::SearchGroup { query, limit } => self
                .search_by_group_title(query, *limit)
                .await?
                .map(QueryResponse::Entries),
            QueryRequest::GetAll => self.get_all().await?.map(QueryResponse::Entries),
            QueryRequest::GetAllGroups => self.get_all_groups().await?.map(QueryResponse::Groups),
            QueryRequest::GetAllPaged {
                offset,
                limit,
                filter,
                groups,
            } => self
                .get_all_paged(*offset, *limit, *filter, groups)
                .await?
                .map(QueryResponse::Entries),
            QueryRequest::SearchTitlePaged {
                query,
                offset,
                limit,
                filter,
                groups,
            } => self
                .search_by_title_paged(query, *offset, *limit, *filter, groups)
                .await?
                .map(QueryResponse::Entries),
            QueryRequest::GetGroups { filter } => self.get_groups(*filter).await?.map(QueryResponse::Groups),
            QueryRequest::GetByTitle { title } => self.get_by_title(title).await?.map(QueryResponse::Entry),
        };

        Ok(outcome)
    }
}

/// Collation key: diacritics folded to ASCII, then lower-cased
fn group_sort_key(group: &str) -> (String, String) {
    (deunicode(group).to_lowercase(), group.to_lowercase())
}

/// Accent- and case-insensitive order, so "Çocuk" sorts with the C's;
/// ties fall back to lower case, then the raw string
fn sort_groups(groups: &mut [String]) {
    groups.sort_by_cached_key(|g| (group_sort_key(g), g.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovieType, RawGroup, RawItem, RawTvg};
    use crate::services::classifier::EntryClassifier;

    fn entry(title: &str, group: &str, movie_type: Option<MovieType>) -> Entry {
        Entry {
            title: title.to_string(),
            url: format!("http://h/{}", title),
            group_title: group.to_string(),
            group_title_raw: group.to_string(),
            movie_type,
            ..Default::default()
        }
    }

    async fn engine_with(entries: &[Entry]) -> (tempfile::TempDir, QueryEngine) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IndexStore::new(Some(dir.path().join("q.db")), 2));
        store.bulk_upsert(entries).await.unwrap();
        (dir, QueryEngine::new(store))
    }

    fn sample() -> Vec<Entry> {
        vec![
            entry("Zeta News", "News", None),
            entry("alpha film", "Action", Some(MovieType::Film)),
            entry("Beta Show", "DIZI", Some(MovieType::TvSeries)),
            entry("Gamma Film", "Action", Some(MovieType::Film)),
            entry("delta live", " Sport ", None),
            entry("Epsilon", "", Some(MovieType::Film)),
        ]
    }

    fn titles(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_search_by_title_is_case_insensitive_and_limited() {
        let (_dir, engine) = engine_with(&sample()).await;

        let found = engine.search_by_title("FILM", 10).await.unwrap().into_inner();
        assert_eq!(titles(&found), vec!["alpha film", "Gamma Film"]);

        let limited = engine.search_by_title("a", 2).await.unwrap().into_inner();
        assert_eq!(titles(&limited), vec!["alpha film", "Beta Show"]);

        assert!(engine.search_by_title("   ", 10).await.unwrap().into_inner().is_empty());
        assert!(engine.search_by_title("film", 0).await.unwrap().into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_search_by_group_title() {
        let (_dir, engine) = engine_with(&sample()).await;
        let found = engine.search_by_group_title("act", 100).await.unwrap().into_inner();
        assert_eq!(titles(&found), vec!["Gamma Film", "alpha film"]);
    }

    #[tokio::test]
    async fn test_groups_are_distinct_trimmed_and_sorted() {
        let (_dir, engine) = engine_with(&sample()).await;

        let all = engine.get_all_groups().await.unwrap().into_inner();
        assert_eq!(all, vec!["Action", "DIZI", "News", "Sport"]);

        let films = engine.get_groups(TypeFilter::Film).await.unwrap().into_inner();
        assert_eq!(films, vec!["Action"]);
    }

    #[test]
    fn test_sort_groups_folds_accents() {
        let mut groups: Vec<String> = ["Zeka", "Çocuk", "Dizi", "Belgesel", "Éducation", "cocuk"]
            .iter()
            .map(|g| g.to_string())
            .collect();
        sort_groups(&mut groups);
        assert_eq!(groups, vec!["Belgesel", "cocuk", "Çocuk", "Dizi", "Éducation", "Zeka"]);
    }

    #[tokio::test]
    async fn test_groups_with_accented_names() {
        let entries = vec![
            entry("a", "Zeka", None),
            entry("b", "Çocuk", None),
            entry("c", "Dizi", None),
            entry("d", "İzle", None),
        ];
        let (_dir, engine) = engine_with(&entries).await;
        let groups = engine.get_all_groups().await.unwrap().into_inner();
        assert_eq!(groups, vec!["Çocuk", "Dizi", "İzle", "Zeka"]);
    }

    #[tokio::test]
    async fn test_paging_reproduces_filtered_set() {
        let mut entries = sample();
        for i in 0..23 {
            entries.push(entry(&format!("Film {:02}", i), "Bulk", Some(MovieType::Film)));
        }
        let (_dir, engine) = engine_with(&entries).await;

        let full = engine
            .get_all_paged(0, usize::MAX, TypeFilter::Film, &[])
            .await
            .unwrap()
            .into_inner();
        assert_eq!(full.len(), 26);

        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let page = engine
                .get_all_paged(offset, 7, TypeFilter::Film, &[])
                .await
                .unwrap()
                .into_inner();
            if page.is_empty() {
                break;
            }
            offset += page.len();
            paged.extend(page);
        }
        assert_eq!(paged, full);

        let past_end = engine
            .get_all_paged(1000, 5, TypeFilter::All, &[])
            .await
            .unwrap()
            .into_inner();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_paged_search_with_groups() {
        let (_dir, engine) = engine_with(&sample()).await;
        let groups = vec!["Action".to_string(), "DIZI".to_string()];

        let found = engine
            .search_by_title_paged("a", 1, 10, TypeFilter::All, &groups)
            .await
            .unwrap()
            .into_inner();
        assert_eq!(titles(&found), vec!["Beta Show", "Gamma Film"]);

        let blank = engine
            .search_by_title_paged(" ", 0, 10, TypeFilter::TvSeries, &[])
            .await
            .unwrap()
            .into_inner();
        assert_eq!(titles(&blank), vec!["Beta Show"]);
    }

    #[tokio::test]
    async fn test_classified_series_is_searchable() {
        let items = vec![RawItem {
            name: "Show.Name.S02E05.mkv".to_string(),
            tvg: Some(RawTvg::default()),
            group: Some(RawGroup {
                title: "TR: DIZI 3".to_string(),
            }),
            url: "http://h/series/1.mkv".to_string(),
        }];
        let classified = EntryClassifier::classify_and_aggregate(&items);
        let (_dir, engine) = engine_with(&classified.into_entries()).await;

        let found = engine.search_by_title("show", 10).await.unwrap().into_inner();
        assert_eq!(titles(&found), vec!["Show Name"]);
        assert_eq!(found[0].seasons.as_ref().unwrap()[0].number, "02");

        let detail = engine.get_by_title("show name").await.unwrap().into_inner();
        assert_eq!(detail.map(|e| e.title), Some("Show Name".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_store_reads_as_empty() {
        let engine = QueryEngine::new(Arc::new(IndexStore::new(None, 1)));

        let outcome = engine.search_by_title("x", 5).await.unwrap();
        assert!(outcome.is_unavailable());
        assert!(engine.get_all().await.unwrap().into_inner().is_empty());
        assert!(engine.get_all_groups().await.unwrap().into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_execute_dispatches_requests() {
        let (_dir, engine) = engine_with(&sample()).await;

        let response = engine
            .execute(&QueryRequest::GetGroups {
                filter: TypeFilter::TvSeries,
            })
            .await
            .unwrap()
            .value()
            .unwrap();
        assert_eq!(response, QueryResponse::Groups(vec!["DIZI".to_string()]));

        let response = engine
            .execute(&QueryRequest::GetByTitle {
                title: "missing".to_string(),
            })
            .await
            .unwrap()
            .value()
            .unwrap();
        assert_eq!(response, QueryResponse::Entry(None));
    }
}
