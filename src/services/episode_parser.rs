use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const PARSE_CACHE_CAPACITY: usize = 10_000;

/// Which title pattern produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePattern {
    /// `S01E02`, `S01-E02`
    SeasonEpisode,
    /// `1x02`
    Cross,
    /// `Season 1 Episode 2`
    Spelled,
    /// `S1E2`, `S01EP2`
    Loose,
}

/// Series title and zero-padded season / episode extracted from a title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeInfo {
    pub series_title: String,
    pub season: String,
    pub episode: String,
    pub pattern: EpisodePattern,
}

lazy_static! {
    static ref PARSE_CACHE: Mutex<LruCache<String, Option<EpisodeInfo>>> =
        Mutex::new(LruCache::new(
            NonZeroUsize::new(PARSE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN)
        ));

    /// Ordered by priority, first match wins
    static ref EPISODE_PATTERNS: Vec<(EpisodePattern, Regex)> = vec![
        (
            EpisodePattern::SeasonEpisode,
            Regex::new(r"(?i)^(.*?)[\s._-]*\bS(\d{1,2})\s*-?\s*E(\d{1,3})\b").unwrap(),
        ),
        (
            EpisodePattern::Cross,
            Regex::new(r"(?i)^(.*?)[\s._-]*\b(\d{1,2})x(\d{1,3})\b").unwrap(),
        ),
        (
            EpisodePattern::Spelled,
            Regex::new(r"(?i)^(.*?)[\s._-]*\bSeason[\s._-]*(\d{1,2})[\s._-]*Episode[\s._-]*(\d{1,3})\b").unwrap(),
        ),
        (
            EpisodePattern::Loose,
            Regex::new(r"(?i)^(.*?)[\s._-]*S(\d{1,2})[\s._-]*EP?[\s._-]*(\d{1,3})").unwrap(),
        ),
    ];

    static ref TITLE_SEPARATORS: Regex = Regex::new(r"[_.]").unwrap();
    static ref MULTI_SPACES: Regex = Regex::new(r"\s+").unwrap();
}

/// Extracts series / season / episode from episode titles
pub struct EpisodeParser;

impl EpisodeParser {
    /// Parse a title. Returns `None` when no pattern matches or when the
    /// series-title prefix is empty after cleaning.
    /// Results are memoized in an LRU cache.
    pub fn parse(title: &str) -> Option<EpisodeInfo> {
        if let Ok(mut cache) = PARSE_CACHE.lock() {
            if let Some(cached) = cache.get(title) {
                return cached.clone();
            }
        }

        let result = Self::parse_uncached(title);

        if let Ok(mut cache) = PARSE_CACHE.lock() {
            cache.put(title.to_string(), result.clone());
        }

        result
    }

    fn parse_uncached(title: &str) -> Option<EpisodeInfo> {
        let (pattern, caps) = EPISODE_PATTERNS
            .iter()
            .find_map(|(pattern, regex)| regex.captures(title).map(|caps| (*pattern, caps)))?;

        let series_title = Self::clean_series_title(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
        if series_title.is_empty() {
            return None;
        }

        let season = Self::pad_number(caps.get(2)?.as_str())?;
        let episode = Self::pad_number(caps.get(3)?.as_str())?;

        Some(EpisodeInfo {
            series_title,
            season,
            episode,
            pattern,
        })
    }

    /// Underscores and periods become spaces, whitespace collapsed, trimmed
    pub fn clean_series_title(prefix: &str) -> String {
        let result = TITLE_SEPARATORS.replace_all(prefix, " ");
        let result = MULTI_SPACES.replace_all(&result, " ");
        result.trim().to_string()
    }

    fn pad_number(digits: &str) -> Option<String> {
        digits.parse::<u32>().ok().map(|n| format!("{:02}", n))
    }
}
