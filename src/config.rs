use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub node_env: String,

    // Playlist source
    pub playlist_url: Option<String>,
    pub fetch_timeout_ms: u64,
    pub max_retries: u32,
    pub max_m3u_size_mb: usize,

    // Index store
    /// `None` when STORE_PATH is set to an empty string
    pub store_path: Option<PathBuf>,
    pub store_max_connections: u32,
    pub offload_enabled: bool,

    // Listing
    pub max_items_page: usize,

    // Misc
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .unwrap_or(3001),
            node_env: env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string()),

            // Playlist source
            playlist_url: env::var("PLAYLIST_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "300000".to_string())
                .parse()
                .unwrap_or(300_000), // 5 minutes

            max_retries: env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),

            max_m3u_size_mb: env::var("MAX_M3U_SIZE_MB")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),

            // Index store
            store_path: Some(
                env::var("STORE_PATH").unwrap_or_else(|_| ".playlist-index/playlist.db".to_string()),
            )
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from),

            store_max_connections: env::var("STORE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),

            offload_enabled: env::var("OFFLOAD_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),

            // Listing
            max_items_page: env::var("MAX_ITEMS_PAGE")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),

            // Misc - Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
        }
    }
}

/// Anything but an explicit "off" value keeps the flag enabled
fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(parse_flag(""));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(" OFF "));
        assert!(!parse_flag("0"));
    }
}
