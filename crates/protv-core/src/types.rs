//! Core types for ProTv

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Heuristic quality tier inferred from a playlist entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QualityHint {
    #[default]
    #[serde(rename = "HD")]
    Hd,
    #[serde(rename = "FHD")]
    Fhd,
    #[serde(rename = "4K")]
    Uhd4k,
}

impl QualityHint {
    /// Infer the tier from a stream URL and display name.
    ///
    /// The 4K check runs after the 1080 check so it wins when both match.
    pub fn infer(url: &str, name: &str) -> Self {
        let mut hint = QualityHint::Hd;
        if url.contains("1080") || name.contains("1080") {
            hint = QualityHint::Fhd;
        }
        if contains_4k(url) || contains_4k(name) {
            hint = QualityHint::Uhd4k;
        }
        hint
    }
}

fn contains_4k(s: &str) -> bool {
    s.contains("4k") || s.contains("4K")
}

impl std::fmt::Display for QualityHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityHint::Hd => write!(f, "HD"),
            QualityHint::Fhd => write!(f, "FHD"),
            QualityHint::Uhd4k => write!(f, "4K"),
        }
    }
}

/// One playlist entry.
///
/// Field names on the wire match the persisted channel cache layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Unique within one ingestion run
    pub id: String,
    /// Display name, never empty
    pub name: String,
    /// Logo reference; empty string means no logo
    #[serde(rename = "logo", default)]
    pub logo_url: String,
    /// Playable resource locator
    #[serde(rename = "url")]
    pub stream_url: String,
    /// Grouping label
    pub category: String,
    /// Country token, used only for ranking
    #[serde(default)]
    pub country: String,
    /// Inferred quality tier
    #[serde(rename = "quality", default)]
    pub quality_hint: QualityHint,
}

impl ChannelRecord {
    /// True when the logo is an absolute http(s) reference
    pub fn has_absolute_logo(&self) -> bool {
        self.logo_url.starts_with("http")
    }

    /// Ranking predicate for the India-first ordering
    pub fn is_indian(&self) -> bool {
        self.country == "IN"
            || self.category.contains("India")
            || self.name.to_lowercase().contains("india")
    }

    /// Radio stations are grouped by category label
    pub fn is_radio(&self) -> bool {
        self.category.to_lowercase().contains("radio")
    }
}

/// UI language, persisted as its two-letter code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "ar")]
    Arabic,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "pt")]
    Portuguese,
}

impl Language {
    pub const ALL: [Language; 9] = [
        Language::Hindi,
        Language::English,
        Language::Spanish,
        Language::French,
        Language::Arabic,
        Language::Japanese,
        Language::German,
        Language::Russian,
        Language::Portuguese,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::Hindi => "hi",
            Language::English => "en",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::Arabic => "ar",
            Language::Japanese => "ja",
            Language::German => "de",
            Language::Russian => "ru",
            Language::Portuguese => "pt",
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        Language::ALL.into_iter().find(|l| l.code() == code)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A rendition advertised by a parsed manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Bandwidth in bits per second
    pub bandwidth: u64,
    /// Video resolution, when advertised
    pub resolution: Option<Resolution>,
}

impl Level {
    /// Quality label shown in the quality menu, e.g. `720p`
    pub fn label(&self) -> String {
        let height = self.resolution.map(|r| r.height).unwrap_or(0);
        format!("{}p", height)
    }
}

/// Playback session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackStatus {
    /// Bootstrapping the streaming client, timer armed
    Connecting,
    /// Media is playing
    Playing,
    /// Paused by the user or autoplay disabled
    Paused,
    /// Stalled waiting for data
    Buffering,
    /// Recovery exhausted
    Failed,
    /// Session torn down
    Closed,
}

impl PlaybackStatus {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackStatus) -> bool {
        use PlaybackStatus::*;
        matches!(
            (self, target),
            // From Connecting
            (Connecting, Connecting) | (Connecting, Playing) | (Connecting, Paused) |
            (Connecting, Failed) | (Connecting, Closed) |
            // From Playing
            (Playing, Paused) | (Playing, Buffering) | (Playing, Connecting) |
            (Playing, Failed) | (Playing, Closed) |
            // From Paused
            (Paused, Playing) | (Paused, Buffering) | (Paused, Connecting) |
            (Paused, Failed) | (Paused, Closed) |
            // From Buffering
            (Buffering, Playing) | (Buffering, Paused) | (Buffering, Connecting) |
            (Buffering, Failed) | (Buffering, Closed) |
            // From Failed
            (Failed, Connecting) | (Failed, Closed)
        )
    }

    /// Terminal states accept no further client events
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackStatus::Failed | PlaybackStatus::Closed)
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Connecting => write!(f, "connecting"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
            PlaybackStatus::Buffering => write!(f, "buffering"),
            PlaybackStatus::Failed => write!(f, "failed"),
            PlaybackStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Why a session ended up in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// Bootstrap timer expired on the relay as well
    StreamUnresponsive,
    /// Transport errors exhausted retries and relay
    ServerNotResponding,
    /// The streaming client cannot handle the format
    UnsupportedFormat,
    /// Native element errored on the relay as well
    NativePlaybackFailed,
    /// Decode recoveries exhausted
    MediaDecodeFailed,
}

impl FailureReason {
    /// User-facing message
    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::StreamUnresponsive => {
                "Stream is unresponsive. The link might be broken or offline."
            }
            FailureReason::ServerNotResponding => {
                "Network Error: Stream server is not responding."
            }
            FailureReason::UnsupportedFormat => {
                "This channel format is not supported by your player."
            }
            FailureReason::NativePlaybackFailed => "Stream playback failed.",
            FailureReason::MediaDecodeFailed => {
                "Media could not be decoded after repeated recovery attempts."
            }
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Manual retry flavours offered from `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryMode {
    /// Clear relay mode and rebuild against the raw URL
    Standard,
    /// Force relay mode and rebuild against the relay URL
    Proxy,
}

/// Supported playback rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackRate {
    Half,
    ThreeQuarters,
    #[default]
    Normal,
    OneAndQuarter,
    OneAndHalf,
    Double,
}

impl PlaybackRate {
    pub const ALL: [PlaybackRate; 6] = [
        PlaybackRate::Half,
        PlaybackRate::ThreeQuarters,
        PlaybackRate::Normal,
        PlaybackRate::OneAndQuarter,
        PlaybackRate::OneAndHalf,
        PlaybackRate::Double,
    ];

    pub fn as_f64(&self) -> f64 {
        match self {
            PlaybackRate::Half => 0.5,
            PlaybackRate::ThreeQuarters => 0.75,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::OneAndQuarter => 1.25,
            PlaybackRate::OneAndHalf => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }
}

impl TryFrom<f64> for PlaybackRate {
    type Error = Error;

    fn try_from(rate: f64) -> Result<Self, Self::Error> {
        PlaybackRate::ALL
            .into_iter()
            .find(|r| r.as_f64() == rate)
            .ok_or(Error::UnsupportedRate { rate })
    }
}

impl std::fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.as_f64())
    }
}
