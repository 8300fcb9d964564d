//! Playlist ingestion: cache lookup, fetch, parse, rank, persist

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::{parse_playlist_cooperative, rank_channels};
use crate::{
    config::IngestConfig,
    store::KeyValueStore,
    types::ChannelRecord,
    Error, Result,
};

/// Where the raw playlist document comes from
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// Fetches the playlist over HTTP(S)
pub struct HttpPlaylistSource {
    client: Client,
    url: Url,
}

impl HttpPlaylistSource {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(client, Url::parse(&config.playlist_url)?))
    }

    pub fn with_client(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl PlaylistSource for HttpPlaylistSource {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::PlaylistFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::PlaylistStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        debug!(url = %self.url, bytes = body.len(), "Playlist downloaded");
        Ok(body)
    }
}

/// Loads the channel catalog once per session
pub struct PlaylistIngestor<P, S> {
    source: P,
    store: S,
    config: IngestConfig,
}

impl<P, S> PlaylistIngestor<P, S>
where
    P: PlaylistSource,
    S: KeyValueStore,
{
    pub fn new(source: P, store: S, config: IngestConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Load the ranked channel list.
    ///
    /// A non-empty cache entry is returned as-is without touching the
    /// network. Any fetch or parse failure is logged and yields an empty
    /// list; the caller supplies fallback content.
    #[instrument(skip(self, progress), fields(url = %self.config.playlist_url))]
    pub async fn load_channels<F>(&self, mut progress: F) -> Vec<ChannelRecord>
    where
        F: FnMut(u8) + Send,
    {
        match self.try_load(&mut progress).await {
            Ok(channels) => channels,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Playlist ingestion failed");
                Vec::new()
            }
        }
    }

    async fn try_load<F>(&self, progress: &mut F) -> Result<Vec<ChannelRecord>>
    where
        F: FnMut(u8) + Send,
    {
        if let Some(cached) = self.cached_channels() {
            info!(channels = cached.len(), "Serving channels from cache");
            progress(100);
            return Ok(cached);
        }

        let body = self.source.fetch().await?;
        let mut channels = parse_playlist_cooperative(
            &body,
            self.config.max_channels,
            self.config.yield_every_lines,
            progress,
        )
        .await;
        rank_channels(&mut channels);

        let serialized = serde_json::to_string(&channels)?;
        if let Err(e) = self.store.set(&self.config.cache_key, &serialized) {
            warn!(error = %e, "Failed to persist channel cache");
        }

        info!(channels = channels.len(), "Playlist ingested");
        progress(100);
        Ok(channels)
    }

    fn cached_channels(&self) -> Option<Vec<ChannelRecord>> {
        let raw = match self.store.get(&self.config.cache_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Channel cache unreadable");
                return None;
            }
        };

        match serde_json::from_str::<Vec<ChannelRecord>>(&raw) {
            Ok(channels) if !channels.is_empty() => Some(channels),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Ignoring incompatible channel cache");
                None
            }
        }
    }

    /// Drop the cached channel list so the next load refetches
    pub fn clear_cache(&self) -> Result<()> {
        self.store.remove(&self.config.cache_key)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
