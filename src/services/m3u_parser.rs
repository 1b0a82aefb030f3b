//! Playlist retrieval and M3U parsing
//!
//! `PlaylistSource` yields raw playlist text; `parse_m3u` turns it into the
//! loosely-typed items the classifier consumes.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;

use crate::models::{RawGroup, RawItem, RawTvg};

// Limits for streamed reads
const MAX_LINE_BYTES: usize = 32 * 1024; // protect against maliciously long lines
const READ_LINE_TIMEOUT: Duration = Duration::from_secs(10);

lazy_static! {
    /// Regex to normalize multiple whitespaces into single space
    static ref MULTI_SPACE_REGEX: Regex = Regex::new(r"\s{2,}").unwrap();
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"(\w+(?:-\w+)*)="([^"]*)""#).unwrap();
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("playlist URL is not configured")]
    NotConfigured,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("playlist too large: {size_mb:.1}MB (limit {limit_mb}MB)")]
    TooLarge { size_mb: f64, limit_mb: usize },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out while reading playlist line")]
    Timeout,

    #[error("playlist line exceeds max length of {0} bytes")]
    LineTooLong(usize),

    #[error("invalid playlist format (missing #EXTM3U header)")]
    MissingHeader,
}

/// Where playlist text comes from
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch(&self) -> Result<String, SourceError>;

    /// Human-readable origin for logs and status
    fn describe(&self) -> String;
}

/// Fixed playlist text
pub struct StaticPlaylistSource {
    content: String,
}

impl StaticPlaylistSource {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[async_trait]
impl PlaylistSource for StaticPlaylistSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        Ok(self.content.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Playlist downloaded over HTTP with retry and size limits
pub struct HttpPlaylistSource {
    client: Client,
    url: Option<String>,
    max_retries: u32,
    max_m3u_size_mb: usize,
}

impl HttpPlaylistSource {
    pub fn new(
        url: Option<String>,
        user_agent: &str,
        timeout_ms: u64,
        max_retries: u32,
        max_m3u_size_mb: usize,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
            max_retries,
            max_m3u_size_mb,
        })
    }

    fn max_bytes(&self) -> u64 {
        (self.max_m3u_size_mb as u64) * 1024 * 1024
    }

    fn too_large(&self, len: u64) -> SourceError {
        SourceError::TooLarge {
            size_mb: len as f64 / 1024f64 / 1024f64,
            limit_mb: self.max_m3u_size_mb,
        }
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Response, SourceError> {
        let mut attempt = 0;

        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    if resp.status().is_success() {
                        if let Some(len) = resp.content_length() {
                            if len > self.max_bytes() {
                                return Err(self.too_large(len));
                            }
                        }

                        return Ok(resp);
                    }

                    let status = resp.status();
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                        let backoff_ms = (1u64 << attempt).saturating_mul(500).min(10_000);
                        tracing::warn!("fetch_retry" = attempt + 1, "reason" = "429", "backoff_ms" = backoff_ms);
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt += 1;
                        continue;
                    }

                    let message = match status {
                        reqwest::StatusCode::NOT_FOUND => "Playlist not found. Check the URL.".to_string(),
                        reqwest::StatusCode::FORBIDDEN => "Access denied. The playlist may require authentication.".to_string(),
                        reqwest::StatusCode::TOO_MANY_REQUESTS => "Too many requests. The playlist server is rate limiting.".to_string(),
                        _ => status
                            .canonical_reason()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "Error".to_string()),
                    };

                    return Err(SourceError::Http {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        let backoff_ms = (1u64 << attempt).saturating_mul(500).min(10_000);
                        tracing::warn!("fetch_retry" = attempt + 1, "reason" = "network", "backoff_ms" = backoff_ms);
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[async_trait]
impl PlaylistSource for HttpPlaylistSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        let url = self.url.as_deref().ok_or(SourceError::NotConfigured)?;

        tracing::info!("Fetching playlist: {}", url);
        let response = self.fetch_with_retry(url).await?;

        if let Some(len) = response.content_length() {
            tracing::info!("Playlist size: {:.2} MB", len as f64 / 1024.0 / 1024.0);
        }

        // Read line by line so oversized or stalled bodies fail early
        let bytes_stream = response.bytes_stream();
        let stream_reader = StreamReader::new(
            bytes_stream.map(|result| result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))),
        );

        let mut reader = BufReader::new(stream_reader);
        let mut line = String::new();
        let mut content = String::new();

        loop {
            line.clear();

            let bytes_read = match tokio::time::timeout(READ_LINE_TIMEOUT, reader.read_line(&mut line)).await {
                Ok(result) => result?,
                Err(_) => return Err(SourceError::Timeout),
            };

            if bytes_read == 0 {
                break;
            }

            if line.len() > MAX_LINE_BYTES {
                return Err(SourceError::LineTooLong(MAX_LINE_BYTES));
            }

            if (content.len() + line.len()) as u64 > self.max_bytes() {
                return Err(self.too_large((content.len() + line.len()) as u64));
            }

            content.push_str(&line);
        }

        Ok(content)
    }

    fn describe(&self) -> String {
        self.url.clone().unwrap_or_else(|| "unconfigured".to_string())
    }
}

/// Parsed EXTINF line data
#[derive(Debug, Default)]
struct ExtinfData {
    attributes: HashMap<String, String>,
    title: String,
}

/// Parse an EXTINF line
/// Format: #EXTINF:duration tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Title
fn parse_extinf(line: &str) -> Option<ExtinfData> {
    let content = line.strip_prefix("#EXTINF:")?;

    // Find the first comma outside quoted attribute values
    let mut in_quotes = false;
    let separator = content.char_indices().find_map(|(i, c)| match c {
        '"' => {
            in_quotes = !in_quotes;
            None
        }
        ',' if !in_quotes => Some(i),
        _ => None,
    })?;

    let header = &content[..separator];
    let title = content[separator + 1..].trim().to_string();

    let attributes = ATTR_REGEX
        .captures_iter(header)
        .filter_map(|caps| Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string())))
        .collect();

    Some(ExtinfData { attributes, title })
}

/// Normalize text: trim and collapse multiple spaces into single space
fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    MULTI_SPACE_REGEX.replace_all(trimmed, " ").to_string()
}

fn extinf_to_item(extinf: ExtinfData, url: &str) -> RawItem {
    let attr = |key: &str| extinf.attributes.get(key).map(|v| normalize_text(v)).unwrap_or_default();

    RawItem {
        name: normalize_text(&extinf.title),
        tvg: Some(RawTvg {
            name: attr("tvg-name"),
            logo: attr("tvg-logo"),
        }),
        group: Some(RawGroup {
            title: attr("group-title"),
        }),
        url: url.to_string(),
    }
}

/// Parse M3U text into raw items. Each `#EXTINF` line is paired with the
/// next non-comment line; other directives are ignored.
pub fn parse_m3u(content: &str) -> Result<Vec<RawItem>, SourceError> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

    match lines.next() {
        Some(first) if first.trim_start_matches('\u{feff}').starts_with("#EXTM3U") => {}
        _ => return Err(SourceError::MissingHeader),
    }

    let mut items = Vec::new();
    let mut current_extinf: Option<ExtinfData> = None;

    for line in lines {
        if line.starts_with("#EXTINF:") {
            current_extinf = parse_extinf(line);
            continue;
        }

        // Skip non-EXTINF comments (#EXTGRP, #EXTVLCOPT, ...)
        if line.starts_with('#') {
            continue;
        }

        if let Some(extinf) = current_extinf.take() {
            items.push(extinf_to_item(extinf, line));
        }
    }

    tracing::debug!(items = items.len(), "Parsed M3U playlist");

    Ok(items)
}
