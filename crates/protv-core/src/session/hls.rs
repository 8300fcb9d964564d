//! HTTP streaming client
//!
//! Loads the source, classifies it, and reports the advertised levels.
//! Media is not decoded; rendering belongs to the embedding player.

use reqwest::{header::CONTENT_TYPE, Client, Response};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{ClientEvent, ClientEvents, StreamBackend, StreamClient, StreamErrorKind};
use crate::{
    config::PlaybackConfig,
    manifest::{detect_stream_format, parse_levels, StreamFormat},
    Result,
};

/// Upper bound on playlist bodies that are read into memory
const MAX_MANIFEST_BYTES: usize = 4 * 1024 * 1024;

/// Backend producing [`HlsClient`]s sharing one connection pool
#[derive(Clone)]
pub struct HlsBackend {
    client: Client,
}

impl HlsBackend {
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.manifest_timeout()).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl StreamBackend for HlsBackend {
    fn attach(&self, source: &str, events: ClientEvents) -> Result<Box<dyn StreamClient>> {
        let url = Url::parse(source)?;
        let mut client = HlsClient {
            http: self.client.clone(),
            url,
            events,
            task: None,
            level: None,
            rate: 1.0,
        };
        client.start_load();
        Ok(Box::new(client))
    }
}

/// Client bound to one source URL
pub struct HlsClient {
    http: Client,
    url: Url,
    events: ClientEvents,
    task: Option<JoinHandle<()>>,
    level: Option<usize>,
    rate: f64,
}

impl HlsClient {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Pinned level, `None` when adaptive
    pub fn level(&self) -> Option<usize> {
        self.level
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn abort_load(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl StreamClient for HlsClient {
    fn start_load(&mut self) {
        self.abort_load();
        let http = self.http.clone();
        let url = self.url.clone();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(load(http, url, events)));
    }

    fn recover_media_error(&mut self) {
        debug!(url = %self.url, "Media recovery requested");
    }

    fn set_level(&mut self, level: Option<usize>) {
        debug!(level = ?level, "Level pinned");
        self.level = level;
    }

    fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn play(&mut self) {
        debug!(url = %self.url, "Play");
    }

    fn pause(&mut self) {
        debug!(url = %self.url, "Pause");
    }

    fn destroy(&mut self) {
        self.abort_load();
    }
}

impl Drop for HlsClient {
    fn drop(&mut self) {
        self.abort_load();
    }
}

#[instrument(skip(http, events), fields(generation = events.generation()))]
async fn load(http: Client, url: Url, events: ClientEvents) {
    let transport_error = match detect_stream_format(&url, None) {
        StreamFormat::Hls => ClientEvent::Fatal(StreamErrorKind::Network),
        StreamFormat::Progressive => ClientEvent::NativeError,
    };

    let mut response = match http.get(url.clone()).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!(status = response.status().as_u16(), "Source rejected request");
            events.emit(transport_error);
            return;
        }
        Err(e) => {
            warn!(error = %e, "Source unreachable");
            events.emit(transport_error);
            return;
        }
    };

    let format = detect_stream_format(&url, content_type(&response).as_deref());

    if format == StreamFormat::Progressive {
        match response.chunk().await {
            Ok(Some(_)) => {
                debug!("Progressive source, no levels");
                events.emit(ClientEvent::ManifestParsed { levels: Vec::new() });
                events.emit(ClientEvent::Playing);
            }
            Ok(None) => {
                warn!("Progressive source sent no data");
                events.emit(ClientEvent::NativeError);
            }
            Err(e) => {
                warn!(error = %e, "Source read failed");
                events.emit(ClientEvent::NativeError);
            }
        }
        return;
    }

    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                body.extend_from_slice(&chunk);
                if body.len() > MAX_MANIFEST_BYTES {
                    warn!(bytes = body.len(), "Playlist too large");
                    events.emit(ClientEvent::Fatal(StreamErrorKind::Other));
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Playlist read failed");
                events.emit(ClientEvent::Fatal(StreamErrorKind::Network));
                return;
            }
        }
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        warn!("Empty playlist");
        events.emit(ClientEvent::Fatal(StreamErrorKind::Network));
        return;
    }

    match parse_levels(&body) {
        Ok(levels) => {
            debug!(levels = levels.len(), "Playlist parsed");
            events.emit(ClientEvent::ManifestParsed { levels });
        }
        Err(e) => {
            warn!(error = %e, "Unplayable source");
            events.emit(ClientEvent::Fatal(StreamErrorKind::Other));
        }
    }
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
