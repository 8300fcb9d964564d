//! Playback sessions
//!
//! A [`Player`] owns at most one live session. Each session runs as a
//! tokio task around a [`SessionMachine`], driving a [`StreamClient`]
//! obtained from a [`StreamBackend`] and publishing [`SessionSnapshot`]s
//! over a watch channel.

mod controller;
#[cfg(feature = "hls")]
mod hls;
mod machine;

pub use controller::{Player, SessionHandle};
#[cfg(feature = "hls")]
pub use hls::{HlsBackend, HlsClient};
pub use machine::{Action, SessionMachine, SessionSnapshot, AUTO_QUALITY};

use tokio::sync::mpsc;

use crate::{types::Level, Result};

/// Classification of fatal streaming-client errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Transport failure fetching playlists or segments
    Network,
    /// Decode failure, recoverable in place
    Media,
    /// Anything else, e.g. an unsupported container
    Other,
}

/// Events a streaming client reports back to its session
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ManifestParsed { levels: Vec<Level> },
    Playing,
    Waiting,
    Fatal(StreamErrorKind),
    /// Failure on the non-adaptive playback path
    NativeError,
}

#[derive(Debug)]
pub(crate) struct TaggedEvent {
    pub(crate) generation: u64,
    pub(crate) event: ClientEvent,
}

/// Sender handed to each attached client.
///
/// Events are tagged with the attach generation so a session can discard
/// reports from clients it already replaced.
#[derive(Debug, Clone)]
pub struct ClientEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl ClientEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event; returns false once the session is gone
    pub fn emit(&self, event: ClientEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// A streaming client attached to one source URL
pub trait StreamClient: Send {
    /// Resume loading in place after a transport error
    fn start_load(&mut self);

    /// Recover from a decode error in place
    fn recover_media_error(&mut self);

    /// Pin a level ordinal, `None` for adaptive selection
    fn set_level(&mut self, level: Option<usize>);

    fn set_rate(&mut self, rate: f64);

    fn play(&mut self);

    fn pause(&mut self);

    /// Release every resource; no events are emitted afterwards
    fn destroy(&mut self);
}

/// Factory for streaming clients
pub trait StreamBackend: Send + Sync {
    /// Build a client for `source` and start loading
    fn attach(&self, source: &str, events: ClientEvents) -> Result<Box<dyn StreamClient>>;
}
