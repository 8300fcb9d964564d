//! Stream manifest probing
//!
//! Classifies a stream source as adaptive (HLS) or progressive and extracts
//! the advertised quality levels from an HLS master playlist.

use m3u8_rs::Playlist;
use tracing::debug;
use url::Url;

use crate::{
    types::{Level, Resolution},
    Error, Result,
};

/// Playback paths a stream source can take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// HLS playlist driven by the adaptive client
    Hls,
    /// Plain media resource handed straight to the player
    Progressive,
}

const PLAYLIST_EXTENSIONS: &[&str] = &[".m3u8", ".m3u"];
const PROGRESSIVE_EXTENSIONS: &[&str] = &[".mp4", ".ts", ".mp3", ".aac", ".webm", ".mkv", ".ogg"];

/// Detect stream format from the URL and, once a response arrives, its
/// `Content-Type`.
///
/// A playlist extension or an `mpegurl` type selects HLS. The progressive
/// path is taken only when the extension or the type names media; anything
/// else is treated as HLS so the body goes through the playlist parser.
pub fn detect_stream_format(url: &Url, content_type: Option<&str>) -> StreamFormat {
    let path = resource_path(url);
    let content_type = content_type.map(str::to_ascii_lowercase);
    let content_type = content_type.as_deref().unwrap_or_default();

    if PLAYLIST_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || content_type.contains("mpegurl")
    {
        return StreamFormat::Hls;
    }
    if PROGRESSIVE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || content_type.starts_with("audio/")
        || content_type.starts_with("video/")
    {
        return StreamFormat::Progressive;
    }

    StreamFormat::Hls
}

/// Lowercased path of the resource, looking through a relay whose query
/// carries the encoded target URL
fn resource_path(url: &Url) -> String {
    let target = url
        .query()
        .and_then(|query| urlencoding::decode(query).ok())
        .and_then(|decoded| Url::parse(&decoded).ok());
    match target {
        Some(target) => target.path().to_lowercase(),
        None => url.path().to_lowercase(),
    }
}

/// Quality levels advertised by an HLS playlist, ascending by bandwidth.
///
/// A media playlist has a single implicit level and yields none.
pub fn parse_levels(content: &[u8]) -> Result<Vec<Level>> {
    let playlist = m3u8_rs::parse_playlist_res(content)
        .map_err(|e| Error::ManifestParse(format!("Failed to parse HLS playlist: {:?}", e)))?;

    let mut levels: Vec<Level> = match playlist {
        Playlist::MasterPlaylist(master) => master
            .variants
            .iter()
            .filter(|variant| !variant.is_i_frame)
            .map(|variant| Level {
                bandwidth: variant.bandwidth,
                resolution: variant
                    .resolution
                    .map(|r| Resolution::new(r.width as u32, r.height as u32)),
            })
            .collect(),
        Playlist::MediaPlaylist(media) => {
            debug!(segments = media.segments.len(), "Media playlist, no variants");
            Vec::new()
        }
    };

    levels.sort_by_key(|level| level.bandwidth);
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720\n\
        720p.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
        360p.m3u8\n";

    const MEDIA: &str = "#EXTM3U\n\
        #EXT-X-TARGETDURATION:6\n\
        #EXT-X-MEDIA-SEQUENCE:1\n\
        #EXTINF:6.0,\n\
        seg1.ts\n";

    #[test]
    fn test_detect_by_extension() {
        let url = Url::parse("https://example.com/live/index.m3u8").unwrap();
        assert_eq!(detect_stream_format(&url, None), StreamFormat::Hls);
        let url = Url::parse("https://example.com/radio/stream.mp3").unwrap();
        assert_eq!(detect_stream_format(&url, None), StreamFormat::Progressive);
        let url = Url::parse("https://example.com/watch").unwrap();
        assert_eq!(detect_stream_format(&url, None), StreamFormat::Hls);
    }

    #[test]
    fn test_detect_through_relay() {
        let url = Url::parse("https://corsproxy.io/?https%3A%2F%2Fx%2Fa.m3u8").unwrap();
        assert_eq!(detect_stream_format(&url, None), StreamFormat::Hls);
        let url = Url::parse("https://corsproxy.io/?https%3A%2F%2Fx%2Fradio.aac").unwrap();
        assert_eq!(detect_stream_format(&url, None), StreamFormat::Progressive);
    }

    #[test]
    fn test_detect_by_content_type() {
        let url = Url::parse("https://example.com/listen").unwrap();
        assert_eq!(detect_stream_format(&url, Some("audio/mpeg")), StreamFormat::Progressive);
        assert_eq!(detect_stream_format(&url, Some("video/MP4")), StreamFormat::Progressive);
        assert_eq!(
            detect_stream_format(&url, Some("application/vnd.apple.mpegurl")),
            StreamFormat::Hls
        );
        assert_eq!(detect_stream_format(&url, Some("text/html")), StreamFormat::Hls);
    }

    #[test]
    fn test_playlist_extension_beats_media_type() {
        // An error page at a playlist URL must not be taken for media
        let url = Url::parse("https://example.com/live/index.m3u8").unwrap();
        assert_eq!(detect_stream_format(&url, Some("video/mp2t")), StreamFormat::Hls);
        assert_eq!(detect_stream_format(&url, Some("text/html; charset=utf-8")), StreamFormat::Hls);
    }

    #[test]
    fn test_master_levels_sorted() {
        let levels = parse_levels(MASTER.as_bytes()).unwrap();
        let labels: Vec<String> = levels.iter().map(Level::label).collect();
        assert_eq!(labels, vec!["360p", "720p"]);
        assert_eq!(levels[0].bandwidth, 800_000);
    }

    #[test]
    fn test_media_playlist_has_no_levels() {
        assert!(parse_levels(MEDIA.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(parse_levels(b"<html>"), Err(Error::ManifestParse(_))));
    }
}
