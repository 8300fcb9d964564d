//! Error types for ProTv Core

use thiserror::Error;

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, Error>;

/// Library error types
#[derive(Error, Debug)]
pub enum Error {
    // Playlist errors
    #[error("Failed to fetch playlist: {0}")]
    PlaylistFetch(String),

    #[error("Playlist source unavailable: HTTP {status}")]
    PlaylistStatus { status: u16 },

    // Storage errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Manifest errors
    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // Playback errors
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Playback session is closed")]
    SessionClosed,

    #[error("Unsupported playback rate: {rate}")]
    UnsupportedRate { rate: f64 },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Returns true if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PlaylistFetch(_)
                | Error::PlaylistStatus { .. }
                | Error::Network(_)
        )
    }

    /// Returns the error code used in log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::PlaylistFetch(_) => "PLAYLIST_FETCH",
            Error::PlaylistStatus { .. } => "PLAYLIST_STATUS",
            Error::Store(_) => "STORE",
            Error::Serialization(_) => "SERIALIZATION",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::SessionClosed => "SESSION_CLOSED",
            Error::UnsupportedRate { .. } => "UNSUPPORTED_RATE",
            Error::UnknownChannel(_) => "UNKNOWN_CHANNEL",
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO",
        }
    }
}
