//! CLI command implementations

use std::{collections::HashSet, path::Path, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context as _};
use indicatif::{ProgressBar, ProgressStyle};
use protv_core::{
    Catalog, ChannelRecord, FileStore, HlsBackend, HttpPlaylistSource, KeyValueStore, Language,
    PlaybackRate, PlaybackStatus, Player, PlaylistIngestor, ProtvConfig,
};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::output::{self, OutputFormat};

/// Shared state for every command
pub struct Context {
    pub config: ProtvConfig,
    pub store: Arc<FileStore>,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(config_path: Option<&Path>, playlist: Option<String>, format: &str) -> anyhow::Result<Self> {
        let mut config = match config_path {
            Some(path) => ProtvConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => ProtvConfig::default(),
        };
        if let Some(url) = playlist {
            config.ingest.playlist_url = url;
        }
        config.validate()?;

        let dir = config.store.resolve_dir()?;
        debug!(dir = %dir.display(), "Opening store");
        let store = Arc::new(FileStore::open(dir)?);

        Ok(Self {
            config,
            store,
            format: OutputFormat::from(format),
        })
    }

    fn ingestor(&self) -> anyhow::Result<PlaylistIngestor<HttpPlaylistSource, Arc<FileStore>>> {
        let source = HttpPlaylistSource::new(&self.config.ingest)?;
        Ok(PlaylistIngestor::new(source, self.store.clone(), self.config.ingest.clone()))
    }

    fn catalog(&self) -> Catalog<Arc<FileStore>> {
        Catalog::new(self.store.clone(), self.config.admin_secret.clone())
    }

    /// Ingest the playlist into a fresh catalog
    async fn load_catalog(&self, refresh: bool) -> anyhow::Result<Catalog<Arc<FileStore>>> {
        let ingestor = self.ingestor()?;
        if refresh {
            ingestor.clear_cache()?;
        }

        let bar = self.progress_bar()?;
        let channels = ingestor
            .load_channels(|percent| bar.set_position(u64::from(percent)))
            .await;
        bar.finish_and_clear();

        let mut catalog = self.catalog();
        catalog.replace_channels(channels);
        Ok(catalog)
    }

    fn progress_bar(&self) -> anyhow::Result<ProgressBar> {
        if self.format == OutputFormat::Json {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}%")?.progress_chars("=>-"),
        );
        bar.set_message("Loading channels");
        Ok(bar)
    }
}

/// Selection flags for the `channels` command
pub struct ChannelFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub radio: bool,
    pub favorites: bool,
    pub limit: usize,
}

/// List channels
pub async fn channels(ctx: &Context, filter: &ChannelFilter, refresh: bool) -> anyhow::Result<()> {
    let catalog = ctx.load_catalog(refresh).await?;

    let mut selected: Vec<&ChannelRecord> = if filter.favorites {
        catalog.favorites()
    } else if filter.radio {
        catalog.radio()
    } else if let Some(category) = filter.category.as_deref() {
        catalog.by_category(category)
    } else {
        catalog.page(0, catalog.channels().len()).iter().collect()
    };

    if let Some(query) = filter.search.as_deref() {
        let hits: HashSet<&str> = catalog.search(query).iter().map(|c| c.id.as_str()).collect();
        selected.retain(|c| hits.contains(c.id.as_str()));
    }
    let total = selected.len();
    selected.truncate(filter.limit);

    println!("{}", output::channels(&selected, ctx.format, |id| catalog.is_favorite(id)));
    if ctx.format != OutputFormat::Json {
        println!("\n{} of {} channels", selected.len(), total);
        if filter.category.is_none() && !filter.radio && !filter.favorites {
            println!("Categories: {}", catalog.categories().join(", "));
        }
    }

    Ok(())
}

/// Toggle a favorite
pub fn favorite(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let mut catalog = ctx.catalog();
    if catalog.toggle_favorite(id)? {
        println!("Added {} to favorites", id);
    } else {
        println!("Removed {} from favorites", id);
    }
    Ok(())
}

/// Show or set the interface language
pub fn language(ctx: &Context, code: Option<&str>) -> anyhow::Result<()> {
    let mut catalog = ctx.catalog();

    match code {
        Some(code) => {
            let language = Language::from_code(code).ok_or_else(|| {
                let known: Vec<&str> = Language::ALL.iter().map(|l| l.code()).collect();
                anyhow!("unknown language '{}', expected one of {}", code, known.join(", "))
            })?;
            catalog.set_language(language)?;
            println!("Language set to {}", language);
        }
        None => {
            println!("Current language: {}", catalog.language());
            for language in Language::ALL {
                let marker = if language == catalog.language() { "*" } else { " " };
                println!("  {} {}", marker, language.code());
            }
        }
    }
    Ok(())
}

/// Open a playback session and stream status updates
pub async fn play(
    ctx: &Context,
    target: &str,
    proxy: bool,
    quality: Option<String>,
    speed: Option<f64>,
    duration: u64,
) -> anyhow::Result<()> {
    let stream_url = resolve_target(ctx, target).await?;
    println!("Playing: {}", stream_url);

    let backend = Arc::new(HlsBackend::new(&ctx.config.playback)?);
    let mut player = Player::new(backend, ctx.config.playback.clone());
    let handle = player.open_url(&stream_url, proxy).await?;

    if let Some(rate) = speed {
        handle.set_speed(PlaybackRate::try_from(rate)?).await?;
    }

    let deadline = (duration > 0).then(|| Instant::now() + Duration::from_secs(duration));
    let mut updates = handle.subscribe();
    let mut pending_quality = quality;

    let outcome = loop {
        let snapshot = updates.borrow_and_update().clone();
        println!("{}", output::status_line(&snapshot, ctx.format));

        if !snapshot.qualities.is_empty() {
            if let Some(label) = pending_quality.take() {
                if snapshot.qualities.contains(&label) {
                    handle.set_quality(label).await?;
                } else {
                    warn!(label = %label, available = ?snapshot.qualities, "Quality not offered");
                }
            }
        }

        if snapshot.status == PlaybackStatus::Failed {
            let reason = snapshot.failure.map(|r| r.message()).unwrap_or("Playback failed");
            break Err(anyhow!("{}", reason));
        }

        let timer = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
            }
            _ = sleep_until(timer), if deadline.is_some() => break Ok(()),
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    player.close().await;
    if outcome.is_err() && !proxy {
        eprintln!("Hint: retry with --proxy to force the relay");
    }
    outcome
}

/// A stream URL is used as-is; anything else is a channel id
async fn resolve_target(ctx: &Context, target: &str) -> anyhow::Result<String> {
    if target.starts_with("http") {
        Url::parse(target)?;
        return Ok(target.to_string());
    }

    let mut catalog = ctx.load_catalog(false).await?;
    let channel = catalog.select_channel(target)?;
    println!("Channel: {} ({})", channel.name, channel.category);
    Ok(channel.stream_url.clone())
}

/// Drop the cached catalog
pub fn cache_clear(ctx: &Context) -> anyhow::Result<()> {
    ctx.ingestor()?.clear_cache()?;
    println!("Channel cache cleared");
    Ok(())
}

/// Show cache location and contents
pub fn cache_info(ctx: &Context) -> anyhow::Result<()> {
    let key = &ctx.config.ingest.cache_key;
    let cached = match ctx.store.get(key)? {
        Some(raw) => match serde_json::from_str::<Vec<ChannelRecord>>(&raw) {
            Ok(channels) => Some(channels.len()),
            Err(e) => {
                warn!(error = %e, "Cache entry unreadable");
                None
            }
        },
        None => None,
    };

    if ctx.format == OutputFormat::Json {
        let info = serde_json::json!({
            "dir": ctx.store.dir().display().to_string(),
            "key": key,
            "channels": cached,
        });
        println!("{}", output::to_json(&info));
        return Ok(());
    }

    println!("Store: {}", ctx.store.dir().display());
    println!("Key:   {}", key);
    match cached {
        Some(count) => println!("Cached channels: {}", count),
        None => println!("Cached channels: none"),
    }
    Ok(())
}

/// Unlock the admin view
pub fn admin(ctx: &Context, secret: &str) -> anyhow::Result<()> {
    let mut catalog = ctx.catalog();
    if !catalog.unlock_admin(secret) {
        bail!("invalid admin secret");
    }
    println!("Admin view unlocked");
    Ok(())
}
