//! ProTv CLI - Headless IPTV Client
//!
//! Features:
//! - Channel catalog browsing (search, categories, radio, favorites)
//! - Favorites and language preferences
//! - Live playback probing with relay escalation
//! - Cache management

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// ProTv CLI - IPTV toolkit
#[derive(Parser)]
#[command(name = "protv")]
#[command(author = "ProTv Developers")]
#[command(version)]
#[command(about = "Browse IPTV playlists and probe live streams", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the playlist URL
    #[arg(long)]
    playlist: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List channels from the catalog
    Channels {
        /// Case-insensitive name filter
        #[arg(short, long)]
        search: Option<String>,

        /// Only channels in this category
        #[arg(short = 'g', long)]
        category: Option<String>,

        /// Only radio stations
        #[arg(long)]
        radio: bool,

        /// Only favorite channels
        #[arg(long)]
        favorites: bool,

        /// Maximum number of rows
        #[arg(short, long, default_value = "24")]
        limit: usize,

        /// Ignore the cached catalog and refetch
        #[arg(long)]
        refresh: bool,
    },

    /// Toggle a channel in favorites
    Favorite {
        /// Channel id
        id: String,
    },

    /// Show or set the interface language
    Language {
        /// Language code (hi, en, es, fr, ar, ja, de, ru, pt)
        code: Option<String>,
    },

    /// Open a playback session and report its status
    Play {
        /// Channel id or stream URL
        target: String,

        /// Start on the relay
        #[arg(long)]
        proxy: bool,

        /// Quality label to select once available (e.g. 720p)
        #[arg(short, long)]
        quality: Option<String>,

        /// Playback rate (0.5, 0.75, 1, 1.25, 1.5, 2)
        #[arg(short, long)]
        speed: Option<f64>,

        /// Seconds to keep the session open (0 = until failure or Ctrl-C)
        #[arg(short, long, default_value = "30")]
        duration: u64,
    },

    /// Manage the channel cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Unlock the admin view
    Admin {
        /// Admin secret
        secret: String,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Drop the cached catalog
    Clear,
    /// Show cache location and contents
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    protv_core::init();

    let ctx = commands::Context::new(cli.config.as_deref(), cli.playlist, &cli.format)?;

    match cli.command {
        Commands::Channels { search, category, radio, favorites, limit, refresh } => {
            let filter = commands::ChannelFilter { search, category, radio, favorites, limit };
            commands::channels(&ctx, &filter, refresh).await?;
        }
        Commands::Favorite { id } => {
            commands::favorite(&ctx, &id)?;
        }
        Commands::Language { code } => {
            commands::language(&ctx, code.as_deref())?;
        }
        Commands::Play { target, proxy, quality, speed, duration } => {
            commands::play(&ctx, &target, proxy, quality, speed, duration).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Clear => commands::cache_clear(&ctx)?,
            CacheAction::Info => commands::cache_info(&ctx)?,
        },
        Commands::Admin { secret } => {
            commands::admin(&ctx, &secret)?;
        }
    }

    Ok(())
}
