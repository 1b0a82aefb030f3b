use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{ClassifiedPlaylist, Entry, MovieType, RawItem};
use crate::services::aggregator::SeriesAggregator;

/// File extensions that mark an item as a downloadable media file
/// (film or episode) rather than a live stream.
pub const MOVIE_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "m4v", "wmv", "flv", "ts", "mpeg", "mpg",
];

lazy_static! {
    // ============ GROUP TITLE REFINEMENT ============
    /// Locale prefix such as "TR:" or "EN |:"
    static ref GROUP_PREFIX: Regex = Regex::new(r"^[^:]*:").unwrap();
    /// Trailing ordinal such as " 3" in "DIZI 3"
    static ref TRAILING_ORDINAL: Regex = Regex::new(r"\s*\d+\s*$").unwrap();
    static ref MULTI_SPACES: Regex = Regex::new(r"\s+").unwrap();

    // ============ URL ============
    static ref URL_EXTENSION: Regex = Regex::new(r"\.([a-zA-Z0-9]+)$").unwrap();
}

/// Result of classifying a single raw item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Live channel, emitted untouched
    Live(Entry),
    /// Media file with an inferred movie type
    Media(Entry),
}

/// Entry classifier for raw playlist items
pub struct EntryClassifier;

impl EntryClassifier {
    /// Refine a raw group label: drop the locale prefix up to the first colon,
    /// strip a trailing ordinal, collapse whitespace.
    pub fn refine_group_title(raw: &str) -> String {
        let result = GROUP_PREFIX.replace(raw, "");
        let result = TRAILING_ORDINAL.replace(&result, "");
        let result = MULTI_SPACES.replace_all(&result, " ");
        result.trim().to_string()
    }

    /// Lower-cased file extension of a URL, ignoring the query string
    pub fn get_url_extension(url: &str) -> Option<String> {
        let without_query = match url.split('?').next() {
            Some(path) if !path.is_empty() => path,
            _ => url,
        };

        URL_EXTENSION
            .captures(without_query)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
    }

    /// Whether the URL points to a media file (film / episode)
    pub fn is_media_url(url: &str) -> bool {
        Self::get_url_extension(url)
            .map(|ext| MOVIE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Infer film vs series from the unrefined group title
    pub fn infer_movie_type(raw_group_title: &str) -> MovieType {
        let upper = raw_group_title.to_uppercase();
        if upper.contains("FILM") {
            MovieType::Film
        } else if upper.contains("DIZI") {
            MovieType::TvSeries
        } else {
            MovieType::Film
        }
    }

    /// Normalize a raw item into an entry without deciding its type
    pub fn map_item(item: &RawItem) -> Entry {
        let title = if item.tvg_name().is_empty() {
            item.name.clone()
        } else {
            item.tvg_name().to_string()
        };
        let group_title_raw = item.group_title().to_string();

        Entry {
            title,
            url: item.url.clone(),
            group_title: Self::refine_group_title(&group_title_raw),
            group_title_raw,
            logo: item.tvg_logo().to_string(),
            movie_type: None,
            seasons: None,
        }
    }

    /// Classify one raw item by URL extension
    pub fn classify(item: &RawItem) -> Classified {
        let mut entry = Self::map_item(item);

        if Self::is_media_url(&entry.url) {
            entry.movie_type = Some(Self::infer_movie_type(&entry.group_title_raw));
            Classified::Media(entry)
        } else {
            Classified::Live(entry)
        }
    }

    /// Classify every raw item and aggregate series episodes.
    /// Live channels go to `streams`; films, demoted episodes and series
    /// records go to `movies`.
    pub fn classify_and_aggregate(items: &[RawItem]) -> ClassifiedPlaylist {
        let mut aggregator = SeriesAggregator::new();
        let mut streams = Vec::new();

        for item in items {
            match Self::classify(item) {
                Classified::Live(entry) => streams.push(entry),
                Classified::Media(entry) => aggregator.push(entry),
            }
        }

        let aggregated = aggregator.finish();

        tracing::debug!(
            streams = streams.len(),
            movies = aggregated.movies.len(),
            demoted = aggregated.demotions.len(),
            "classification complete"
        );

        ClassifiedPlaylist {
            movies: aggregated.movies,
            streams,
            demotions: aggregated.demotions,
        }
    }
}
