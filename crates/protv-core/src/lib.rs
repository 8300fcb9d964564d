//! ProTv Core - IPTV Library for ProTv
//!
//! This crate provides the core functionality for live TV playback:
//! - M3U playlist ingestion with cooperative parsing and caching
//! - Channel ranking and catalog views (search, categories, favorites)
//! - Key-value persistence for cache, favorites and language
//! - HLS master playlist probing
//! - Resilient playback sessions with relay escalation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          ProTv Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Playlist   │  │    Parser    │  │    Ranker    │           │
//! │  │    Source    │─▶│  (M3U/EXTINF)│─▶│              │           │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘           │
//! │                                             │                   │
//! │  ┌──────────────┐                    ┌──────┴──────┐            │
//! │  │ KeyValueStore│◀───────────────────│   Catalog   │            │
//! │  └──────────────┘                    └──────┬──────┘            │
//! │                                             │ open              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────┴──────┐            │
//! │  │   Manifest   │◀─│    Stream    │◀─│   Player    │            │
//! │  │    Probe     │  │   Backend    │  │   Session   │            │
//! │  └──────────────┘  └──────────────┘  └─────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod error;
#[cfg(feature = "hls")]
pub mod manifest;
pub mod playlist;
pub mod session;
pub mod store;
pub mod types;

pub use catalog::{placeholder_channels, Catalog};
pub use config::{IngestConfig, PlaybackConfig, ProtvConfig, StoreConfig};
pub use error::{Error, Result};
pub use playlist::{parse_playlist, rank_channels, HttpPlaylistSource, PlaylistIngestor, PlaylistSource};
#[cfg(feature = "hls")]
pub use session::HlsBackend;
pub use session::{
    ClientEvent, ClientEvents, Player, SessionHandle, SessionMachine, SessionSnapshot,
    StreamBackend, StreamClient, StreamErrorKind,
};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "ProTv Core initialized");
}
