//! Configuration for ingestion, storage, and playback

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::{Error, Result};

/// Public iptv-org index used when no playlist is configured
pub const DEFAULT_PLAYLIST_URL: &str = "https://iptv-org.github.io/iptv/index.m3u";

/// Default pass-through relay; the stream URL is appended URL-encoded
pub const DEFAULT_RELAY_PREFIX: &str = "https://corsproxy.io/?";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtvConfig {
    pub ingest: IngestConfig,
    pub playback: PlaybackConfig,
    pub store: StoreConfig,
    /// Shared secret for the admin view. Not an authentication boundary.
    pub admin_secret: Option<String>,
}

impl ProtvConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: ProtvConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_channels == 0 {
            return Err(Error::InvalidConfig("max_channels must be positive".into()));
        }
        if self.ingest.yield_every_lines == 0 {
            return Err(Error::InvalidConfig("yield_every_lines must be positive".into()));
        }
        if self.ingest.request_timeout_ms == 0
            || self.playback.bootstrap_timeout_ms == 0
            || self.playback.manifest_timeout_ms == 0
        {
            return Err(Error::InvalidConfig("timeouts must be positive".into()));
        }
        Url::parse(&self.ingest.playlist_url)?;
        if let Some(prefix) = &self.playback.relay_prefix {
            let url = Url::parse(prefix)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::InvalidConfig(format!(
                    "relay prefix must be http(s): {}",
                    prefix
                )));
            }
        }
        Ok(())
    }
}

/// Playlist ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Remote playlist document
    pub playlist_url: String,
    /// Stop parsing once this many records are retained
    pub max_channels: usize,
    /// Yield to the scheduler and report progress every N source lines
    pub yield_every_lines: usize,
    /// HTTP timeout for the playlist fetch
    pub request_timeout_ms: u64,
    /// Versioned cache key for the ranked channel list
    pub cache_key: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            playlist_url: DEFAULT_PLAYLIST_URL.to_string(),
            max_channels: 4000,
            yield_every_lines: 1000,
            request_timeout_ms: 30_000,
            cache_key: crate::store::CHANNEL_CACHE_KEY.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Playback session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Wall-clock bound on reaching a parsed manifest
    pub bootstrap_timeout_ms: u64,
    /// Transparent transport retries before relay escalation
    pub max_network_retries: u32,
    /// In-place decode recoveries per attached client
    pub max_media_recoveries: u32,
    /// Relay prefix; `None` disables relay escalation
    pub relay_prefix: Option<String>,
    /// Start playing as soon as the manifest is parsed
    pub autoplay: bool,
    /// HTTP timeout for manifest requests made by the streaming client
    pub manifest_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout_ms: 12_000,
            max_network_retries: 2,
            max_media_recoveries: 3,
            relay_prefix: Some(DEFAULT_RELAY_PREFIX.to_string()),
            autoplay: true,
            manifest_timeout_ms: 15_000,
        }
    }
}

impl PlaybackConfig {
    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }

    /// Wrap a stream URL in the relay, if one is configured
    pub fn relay_url(&self, stream_url: &str) -> Option<String> {
        self.relay_prefix
            .as_ref()
            .map(|prefix| format!("{}{}", prefix, urlencoding::encode(stream_url)))
    }
}

/// Persistent store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for persisted entries; platform data dir when unset
    pub data_dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|d| d.join("protv"))
            .ok_or_else(|| Error::InvalidConfig("no platform data directory available".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProtvConfig::default();
        assert_eq!(config.ingest.max_channels, 4000);
        assert_eq!(config.ingest.cache_key, "iptv_channels_v5_cache");
        assert_eq!(config.playback.bootstrap_timeout(), Duration::from_secs(12));
        assert_eq!(config.playback.max_network_retries, 2);
        assert!(config.playback.autoplay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: ProtvConfig =
            serde_json::from_str(r#"{"playback": {"relay_prefix": null}}"#).unwrap();
        assert!(config.playback.relay_prefix.is_none());
        assert_eq!(config.playback.bootstrap_timeout_ms, 12_000);
        assert_eq!(config.ingest.playlist_url, DEFAULT_PLAYLIST_URL);
    }

    #[test]
    fn test_relay_url_encodes_stream() {
        let config = PlaybackConfig::default();
        let wrapped = config.relay_url("https://cdn.example.com/live.m3u8?a=1&b=2").unwrap();
        assert_eq!(
            wrapped,
            "https://corsproxy.io/?https%3A%2F%2Fcdn.example.com%2Flive.m3u8%3Fa%3D1%26b%3D2"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ProtvConfig::default();
        config.ingest.max_channels = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = ProtvConfig::default();
        config.playback.relay_prefix = Some("ftp://relay.example.com/?".into());
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
