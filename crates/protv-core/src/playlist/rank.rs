//! Catalog ordering

use std::cmp::Reverse;

use crate::types::ChannelRecord;

/// Stable three-key ordering: absolute logos first, then India-related
/// channels, then case-insensitive name.
pub fn rank_channels(channels: &mut [ChannelRecord]) {
    channels.sort_by_cached_key(|c| {
        (
            Reverse(c.has_absolute_logo()),
            Reverse(c.is_indian()),
            c.name.to_lowercase(),
        )
    });
}
