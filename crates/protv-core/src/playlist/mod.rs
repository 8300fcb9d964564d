//! Playlist ingestion pipeline

mod ingest;
mod parser;
mod rank;

pub use ingest::{HttpPlaylistSource, PlaylistIngestor, PlaylistSource};
pub use parser::{
    attribute, parse_playlist, parse_playlist_cooperative, PlaylistParser, ADULT_MARKER,
    DEFAULT_CATEGORY, EXTINF_MARKER, PLACEHOLDER_NAME,
};
pub use rank::rank_channels;
