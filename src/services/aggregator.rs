//! Series aggregation
//!
//! Folds individual episode entries into one series record per
//! case-insensitive series title. Seasons are keyed by their zero-padded
//! number, so a `BTreeMap` yields them in ascending order.

use std::collections::{BTreeMap, HashMap};

use crate::models::{Demotion, Entry, MovieType, Season};
use crate::services::episode_parser::EpisodeParser;

/// Accumulated series data while scanning media entries
#[derive(Debug)]
struct SeriesAccumulator {
    /// First-seen casing
    title: String,
    group_title: String,
    group_title_raw: String,
    logo: String,
    seasons: BTreeMap<String, Vec<Entry>>,
}

impl SeriesAccumulator {
    fn new(title: String) -> Self {
        Self {
            title,
            group_title: String::new(),
            group_title_raw: String::new(),
            logo: String::new(),
            seasons: BTreeMap::new(),
        }
    }

    /// Keep the most recent non-empty group / logo values
    fn absorb_metadata(&mut self, entry: &Entry) {
        if !entry.group_title.is_empty() {
            self.group_title = entry.group_title.clone();
        }
        if !entry.group_title_raw.is_empty() {
            self.group_title_raw = entry.group_title_raw.clone();
        }
        if !entry.logo.is_empty() {
            self.logo = entry.logo.clone();
        }
    }

    fn into_entry(self) -> Entry {
        let seasons = self
            .seasons
            .into_iter()
            .map(|(number, episodes)| Season { number, episodes })
            .collect();

        Entry {
            title: self.title,
            url: String::new(),
            group_title: self.group_title,
            group_title_raw: self.group_title_raw,
            logo: self.logo,
            movie_type: Some(MovieType::TvSeries),
            seasons: Some(seasons),
        }
    }
}

/// Aggregation result
#[derive(Debug, Default)]
pub struct Aggregated {
    /// Films and demoted episodes in input order, followed by series records
    pub movies: Vec<Entry>,
    pub demotions: Vec<Demotion>,
}

/// Groups tv-series media entries into series records
#[derive(Debug, Default)]
pub struct SeriesAggregator {
    films: Vec<Entry>,
    demotions: Vec<Demotion>,
    /// lower-cased series title -> position in `series`
    index: HashMap<String, usize>,
    series: Vec<SeriesAccumulator>,
}

impl SeriesAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one classified media entry
    pub fn push(&mut self, mut entry: Entry) {
        if entry.movie_type != Some(MovieType::TvSeries) {
            entry.movie_type = Some(MovieType::Film);
            self.films.push(entry);
            return;
        }

        let Some(info) = EpisodeParser::parse(&entry.title) else {
            tracing::debug!(title = %entry.title, "episode title not recognized, storing as film");
            self.demotions.push(Demotion {
                title: entry.title.clone(),
                group_title_raw: entry.group_title_raw.clone(),
            });
            entry.movie_type = Some(MovieType::Film);
            self.films.push(entry);
            return;
        };

        let key = info.series_title.to_lowercase();
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                self.series.push(SeriesAccumulator::new(info.series_title.clone()));
                self.index.insert(key, self.series.len() - 1);
                self.series.len() - 1
            }
        };

        let accum = &mut self.series[position];
        accum.absorb_metadata(&entry);
        accum.seasons.entry(info.season).or_default().push(entry);
    }

    /// Emit films first, then one record per series in first-seen order
    pub fn finish(self) -> Aggregated {
        let series_count = self.series.len();
        let mut movies = self.films;
        movies.extend(self.series.into_iter().map(SeriesAccumulator::into_entry));

        tracing::debug!(
            series = series_count,
            demoted = self.demotions.len(),
            "series aggregation complete"
        );

        Aggregated {
            movies,
            demotions: self.demotions,
        }
    }
}
