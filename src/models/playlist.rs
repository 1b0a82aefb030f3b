use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Movie classification for media-file entries.
/// Live channels carry no movie type at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovieType {
    #[serde(rename = "film")]
    Film,
    #[serde(rename = "tv-series")]
    TvSeries,
}

impl MovieType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovieType::Film => "film",
            MovieType::TvSeries => "tv-series",
        }
    }
}

impl std::fmt::Display for MovieType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovieType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "film" => Ok(MovieType::Film),
            "tv-series" => Ok(MovieType::TvSeries),
            other => Err(format!("unknown movie type: {}", other)),
        }
    }
}

/// Type filter used by paged listing and group enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeFilter {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "film")]
    Film,
    #[serde(rename = "tv-series")]
    TvSeries,
}

impl TypeFilter {
    /// Whether an entry with the given movie type passes this filter
    pub fn accepts(&self, movie_type: Option<MovieType>) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Film => movie_type == Some(MovieType::Film),
            TypeFilter::TvSeries => movie_type == Some(MovieType::TvSeries),
        }
    }
}

/// One season of an aggregated series record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    /// Zero-padded season number ("01", "02", ...)
    pub number: String,
    pub episodes: Vec<Entry>,
}

/// A playlist item after classification: live channel, film, or series.
///
/// Every string field defaults to empty rather than being optional, so
/// consumers never need to distinguish "missing" from "blank".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub group_title: String,
    #[serde(default)]
    pub group_title_raw: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_type: Option<MovieType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasons: Option<Vec<Season>>,
}

impl Entry {
    pub fn is_live(&self) -> bool {
        self.movie_type.is_none()
    }

    pub fn is_series_record(&self) -> bool {
        self.movie_type == Some(MovieType::TvSeries) && self.seasons.is_some()
    }

    /// Total episodes across all seasons (0 for non-series entries)
    pub fn episode_count(&self) -> usize {
        self.seasons
            .as_ref()
            .map(|seasons| seasons.iter().map(|s| s.episodes.len()).sum())
            .unwrap_or(0)
    }
}

/// `tvg` block of a raw playlist item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTvg {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logo: String,
}

/// `group` block of a raw playlist item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGroup {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
}

/// Loosely-typed item as produced by an M3U parser.
/// Every field is optional and coerced to a string on input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default)]
    pub tvg: Option<RawTvg>,
    #[serde(default)]
    pub group: Option<RawGroup>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
}

impl RawItem {
    pub fn tvg_name(&self) -> &str {
        self.tvg.as_ref().map(|t| t.name.as_str()).unwrap_or("")
    }

    pub fn tvg_logo(&self) -> &str {
        self.tvg.as_ref().map(|t| t.logo.as_str()).unwrap_or("")
    }

    pub fn group_title(&self) -> &str {
        self.group.as_ref().map(|g| g.title.as_str()).unwrap_or("")
    }
}

/// Accept strings, numbers, booleans and null; everything else is stringified
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

/// A tv-series item whose title matched no episode pattern and was
/// stored as a plain film instead of being aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demotion {
    pub title: String,
    pub group_title_raw: String,
}

/// Output of classification + aggregation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedPlaylist {
    /// Films, demoted episodes and aggregated series records
    pub movies: Vec<Entry>,
    /// Live channels
    pub streams: Vec<Entry>,
    #[serde(default)]
    pub demotions: Vec<Demotion>,
}

impl ClassifiedPlaylist {
    pub fn series_count(&self) -> usize {
        self.movies.iter().filter(|e| e.is_series_record()).count()
    }

    /// All entries in upsert order (movies first, then streams)
    pub fn into_entries(self) -> Vec<Entry> {
        let mut entries = self.movies;
        entries.extend(self.streams);
        entries
    }
}

/// Query parameters for title / group search endpoints
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Query parameters for paged listing.
/// `groups` is a comma-separated list of exact group titles.
#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
    #[serde(default)]
    pub filter: TypeFilter,
    #[serde(default)]
    pub groups: Option<String>,
}

impl ItemsQuery {
    pub fn group_list(&self) -> Vec<String> {
        self.groups
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(|g| g.trim())
                    .filter(|g| !g.is_empty())
                    .map(|g| g.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Query parameters for group enumeration
#[derive(Debug, Deserialize)]
pub struct GroupsQuery {
    #[serde(default)]
    pub filter: TypeFilter,
}

fn default_page_limit() -> usize {
    crate::services::query_engine::DEFAULT_PAGE_LIMIT
}

/// Entries response (search, listing, full dump)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesResponse {
    pub items: Vec<Entry>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub degraded: bool,
}

/// Groups response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupsResponse {
    pub groups: Vec<String>,
    pub total: usize,
    pub degraded: bool,
}
