//! Database row types for SQLite
//!
//! These types map directly to `playlist` rows and convert to and from
//! the logical `Entry` in models/playlist.rs. The lower-cased columns are
//! derived on every write and never leave this module.

use sqlx::FromRow;

use crate::models::playlist::{Entry, MovieType, Season};

/// Playlist row from database
#[derive(Debug, Clone, FromRow)]
pub struct EntryRow {
    pub title: String,
    pub url: String,
    pub group_title: String,
    pub group_title_raw: String,
    pub logo: String,
    pub movie_type: Option<String>,
    /// JSON-encoded `Vec<Season>`, only set on series records
    pub seasons: Option<String>,
    pub title_lower: String,
    pub group_title_lower: String,
}

impl EntryRow {
    /// Build a row from an entry, recomputing the derived columns
    pub fn from_entry(entry: &Entry) -> Result<Self, serde_json::Error> {
        let seasons = entry
            .seasons
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            title: entry.title.clone(),
            url: entry.url.clone(),
            group_title: entry.group_title.clone(),
            group_title_raw: entry.group_title_raw.clone(),
            logo: entry.logo.clone(),
            movie_type: entry.movie_type.map(|t| t.as_str().to_string()),
            seasons,
            title_lower: entry.title.to_lowercase(),
            group_title_lower: entry.group_title.to_lowercase(),
        })
    }

    /// Convert back to the logical entry, dropping derived columns
    pub fn into_entry(self) -> Result<Entry, serde_json::Error> {
        let seasons = self
            .seasons
            .as_deref()
            .map(serde_json::from_str::<Vec<Season>>)
            .transpose()?;

        Ok(Entry {
            title: self.title,
            url: self.url,
            group_title: self.group_title,
            group_title_raw: self.group_title_raw,
            logo: self.logo,
            movie_type: self.movie_type.as_deref().and_then(parse_movie_type),
            seasons,
        })
    }
}

/// Unknown stored values read back as untyped (live)
fn parse_movie_type(s: &str) -> Option<MovieType> {
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_derives_lowercase_columns() {
        let entry = Entry {
            title: "Show Name".to_string(),
            group_title: "DIZI".to_string(),
            movie_type: Some(MovieType::TvSeries),
            seasons: Some(vec![Season {
                number: "01".to_string(),
                episodes: vec![],
            }]),
            ..Default::default()
        };

        let row = EntryRow::from_entry(&entry).unwrap();
        assert_eq!(row.title_lower, "show name");
        assert_eq!(row.group_title_lower, "dizi");
        assert_eq!(row.movie_type.as_deref(), Some("tv-series"));

        assert_eq!(row.into_entry().unwrap(), entry);
    }

    #[test]
    fn test_unknown_movie_type_reads_as_live() {
        let row = EntryRow {
            title: "x".to_string(),
            url: String::new(),
            group_title: String::new(),
            group_title_raw: String::new(),
            logo: String::new(),
            movie_type: Some("documentary".to_string()),
            seasons: None,
            title_lower: "x".to_string(),
            group_title_lower: String::new(),
        };
        assert_eq!(row.into_entry().unwrap().movie_type, None);
    }
}
