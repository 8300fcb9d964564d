//! Single-pass M3U parser
//!
//! Entries follow the two-line convention:
//!
//! ```text
//! #EXTINF:-1 tvg-logo="http://..." group-title="News" tvg-country="IN",Channel Name
//! http://stream.example.com/live.m3u8
//! ```
//!
//! A metadata line that is not followed by a URL line is dropped silently.

use std::ops::ControlFlow;

use crate::types::{ChannelRecord, QualityHint};

/// Metadata line marker
pub const EXTINF_MARKER: &str = "#EXTINF";
/// Name used when a metadata line carries no comma
pub const PLACEHOLDER_NAME: &str = "Unknown Station";
/// Category used when `group-title` is absent
pub const DEFAULT_CATEGORY: &str = "General";
/// Entries whose name contains this are excluded
pub const ADULT_MARKER: &str = "XXX";

/// Metadata waiting for its URL line
#[derive(Debug)]
struct PendingEntry {
    id: String,
    name: String,
    logo_url: String,
    category: String,
    country: String,
}

impl PendingEntry {
    fn from_metadata(index: usize, line: &str) -> Self {
        let name = match line.rfind(',') {
            Some(pos) => line[pos + 1..].trim().to_string(),
            None => PLACEHOLDER_NAME.to_string(),
        };

        Self {
            id: format!("ch-{}", index),
            name,
            logo_url: attribute(line, "tvg-logo").unwrap_or_default().to_string(),
            category: attribute(line, "group-title")
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            country: attribute(line, "tvg-country").unwrap_or_default().to_string(),
        }
    }

    fn into_record(self, stream_url: &str) -> Option<ChannelRecord> {
        if self.name.is_empty() || stream_url.is_empty() || self.name.contains(ADULT_MARKER) {
            return None;
        }

        let quality_hint = QualityHint::infer(stream_url, &self.name);
        Some(ChannelRecord {
            id: self.id,
            name: self.name,
            logo_url: self.logo_url,
            stream_url: stream_url.to_string(),
            category: self.category,
            country: self.country,
            quality_hint,
        })
    }
}

/// Extract a quoted `key="value"` attribute from a metadata line
pub fn attribute<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{}=\"", key);
    let mut from = 0;

    while let Some(found) = line[from..].find(&needle) {
        let start = from + found;
        let at_boundary = line[..start]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || c == ':' || c == ',');

        let value_start = start + needle.len();
        if at_boundary {
            let end = line[value_start..].find('"')?;
            return Some(&line[value_start..value_start + end]);
        }
        from = value_start;
    }

    None
}

/// Line-level parser state
#[derive(Debug)]
pub struct PlaylistParser {
    max_channels: usize,
    pending: Option<PendingEntry>,
    channels: Vec<ChannelRecord>,
}

impl PlaylistParser {
    pub fn new(max_channels: usize) -> Self {
        Self {
            max_channels,
            pending: None,
            channels: Vec::new(),
        }
    }

    /// Feed one source line. Breaks once the record cap is reached.
    pub fn feed(&mut self, index: usize, raw: &str) -> ControlFlow<()> {
        let line = raw.trim();

        if line.starts_with(EXTINF_MARKER) {
            self.pending = Some(PendingEntry::from_metadata(index, line));
        } else if line.starts_with("http") {
            if let Some(record) = self.pending.take().and_then(|p| p.into_record(line)) {
                self.channels.push(record);
            }
        }

        if self.channels.len() >= self.max_channels {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Records in source order
    pub fn finish(self) -> Vec<ChannelRecord> {
        self.channels
    }
}

/// Parse a whole document without yielding
pub fn parse_playlist(content: &str, max_channels: usize) -> Vec<ChannelRecord> {
    let mut parser = PlaylistParser::new(max_channels);
    for (index, line) in content.split('\n').enumerate() {
        if parser.feed(index, line).is_break() {
            break;
        }
    }
    parser.finish()
}

/// Parse a document, yielding to the runtime and reporting progress every
/// `yield_every` lines so a long parse does not starve other tasks.
pub async fn parse_playlist_cooperative<F>(
    content: &str,
    max_channels: usize,
    yield_every: usize,
    progress: &mut F,
) -> Vec<ChannelRecord>
where
    F: FnMut(u8) + Send,
{
    let lines: Vec<&str> = content.split('\n').collect();
    let total = lines.len().max(1);
    let yield_every = yield_every.max(1);
    let mut parser = PlaylistParser::new(max_channels);

    for (index, line) in lines.iter().enumerate() {
        // Blank lines carry nothing and never report progress
        if line.trim().is_empty() {
            continue;
        }
        if parser.feed(index, line).is_break() {
            break;
        }

        if index % yield_every == 0 {
            progress((index * 100 / total) as u8);
            tokio::task::yield_now().await;
        }
    }

    parser.finish()
}
