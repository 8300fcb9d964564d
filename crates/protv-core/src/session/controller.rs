//! Session driver and player facade

use std::{collections::VecDeque, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, instrument, warn};

use super::{
    machine::{Action, SessionMachine, SessionSnapshot},
    ClientEvent, ClientEvents, StreamBackend, StreamClient, StreamErrorKind, TaggedEvent,
};
use crate::{
    config::PlaybackConfig,
    types::{ChannelRecord, PlaybackRate, PlaybackStatus, RetryMode, SessionId},
    Error, Result,
};

/// Placeholder deadline while the timer is disarmed
const IDLE: Duration = Duration::from_secs(86_400);

type Reply = oneshot::Sender<Result<()>>;

enum Command {
    Retry(RetryMode, Reply),
    Play(Reply),
    Pause(Reply),
    SetQuality(String, Reply),
    SetSpeed(PlaybackRate, Reply),
    Close(oneshot::Sender<()>),
}

/// Handle to one playback session.
///
/// Cloneable; every clone addresses the same session. Operations on a
/// session that has been closed return [`Error::SessionClosed`].
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.borrow().status
    }

    /// Receiver for state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Wait until a published state satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| Error::SessionClosed)?;
        Ok(snapshot.clone())
    }

    /// Manual retry from `Failed`
    pub async fn retry(&self, mode: RetryMode) -> Result<()> {
        self.request(|reply| Command::Retry(mode, reply)).await
    }

    pub async fn play(&self) -> Result<()> {
        self.request(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await
    }

    /// Select `Auto` or an advertised quality label
    pub async fn set_quality(&self, label: impl Into<String>) -> Result<()> {
        let label = label.into();
        self.request(|reply| Command::SetQuality(label, reply)).await
    }

    pub async fn set_speed(&self, rate: PlaybackRate) -> Result<()> {
        self.request(|reply| Command::SetSpeed(rate, reply)).await
    }

    /// Close the session and wait until its client is destroyed
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Close(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    async fn request<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }
}

/// Owns the single active playback session
pub struct Player {
    backend: Arc<dyn StreamBackend>,
    config: PlaybackConfig,
    active: Option<(SessionHandle, JoinHandle<()>)>,
}

impl Player {
    pub fn new(backend: Arc<dyn StreamBackend>, config: PlaybackConfig) -> Self {
        Self {
            backend,
            config,
            active: None,
        }
    }

    /// Open a session for `channel`, closing any previous one first
    pub async fn open(&mut self, channel: &ChannelRecord) -> Result<SessionHandle> {
        self.open_url(&channel.stream_url, false).await
    }

    /// Open a session for a raw stream URL, optionally starting on the relay
    #[instrument(skip(self))]
    pub async fn open_url(&mut self, stream_url: &str, force_relay: bool) -> Result<SessionHandle> {
        if stream_url.trim().is_empty() {
            return Err(Error::InvalidConfig("empty stream url".into()));
        }
        self.close().await;

        let machine = SessionMachine::new(stream_url, self.config.clone(), force_relay);
        let id = machine.id();
        let (state_tx, state_rx) = watch::channel(machine.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut task = SessionTask {
            machine,
            backend: self.backend.clone(),
            bootstrap_timeout: self.config.bootstrap_timeout(),
            client: None,
            generation: 0,
            deadline: None,
            event_tx,
            event_rx,
            commands: command_rx,
            state: state_tx,
        };
        task.start();
        let join = tokio::spawn(task.run());

        let handle = SessionHandle {
            id,
            commands: command_tx,
            state: state_rx,
        };
        info!(session_id = %id, "Session opened");
        self.active = Some((handle.clone(), join));
        Ok(handle)
    }

    /// Close the active session, if any, and wait for teardown
    pub async fn close(&mut self) {
        if let Some((handle, join)) = self.active.take() {
            handle.close().await;
            if let Err(e) = join.await {
                warn!(error = %e, "Session task ended abnormally");
            }
            info!(session_id = %handle.id(), "Session closed");
        }
    }

    pub fn active(&self) -> Option<&SessionHandle> {
        self.active.as_ref().map(|(handle, _)| handle)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // Aborting drops the task, which destroys its client
        if let Some((_, join)) = self.active.take() {
            join.abort();
        }
    }
}

struct SessionTask {
    machine: SessionMachine,
    backend: Arc<dyn StreamBackend>,
    bootstrap_timeout: Duration,
    client: Option<Box<dyn StreamClient>>,
    generation: u64,
    deadline: Option<Instant>,
    event_tx: mpsc::UnboundedSender<TaggedEvent>,
    event_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<SessionSnapshot>,
}

impl SessionTask {
    /// Attach the first client before the task is spawned
    fn start(&mut self) {
        let actions = self.machine.start();
        self.apply(actions);
        self.publish();
    }

    async fn run(mut self) {
        loop {
            let timer = self.deadline.unwrap_or_else(|| Instant::now() + IDLE);

            tokio::select! {
                Some(tagged) = self.event_rx.recv() => {
                    if tagged.generation != self.generation {
                        debug!(generation = tagged.generation, "Dropping event from replaced client");
                        continue;
                    }
                    let actions = self.on_event(tagged.event);
                    self.apply(actions);
                }
                command = self.commands.recv() => match command {
                    Some(Command::Close(ack)) => {
                        self.shutdown();
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.on_command(command),
                    None => {
                        // Every handle dropped
                        self.shutdown();
                        break;
                    }
                },
                _ = sleep_until(timer), if self.deadline.is_some() => {
                    self.deadline = None;
                    let actions = self.machine.on_timeout();
                    self.apply(actions);
                }
            }

            self.publish();
        }
    }

    fn on_event(&mut self, event: ClientEvent) -> Vec<Action> {
        match event {
            ClientEvent::ManifestParsed { levels } => self.machine.on_manifest_parsed(&levels),
            ClientEvent::Playing => self.machine.on_playing(),
            ClientEvent::Waiting => self.machine.on_waiting(),
            ClientEvent::Fatal(kind) => self.machine.on_fatal_error(kind),
            ClientEvent::NativeError => self.machine.on_native_error(),
        }
    }

    fn on_command(&mut self, command: Command) {
        let (result, reply) = match command {
            Command::Retry(mode, reply) => (self.machine.retry(mode), reply),
            Command::Play(reply) => (self.machine.play(), reply),
            Command::Pause(reply) => (self.machine.pause(), reply),
            Command::SetQuality(label, reply) => (Ok(self.machine.set_quality(&label)), reply),
            Command::SetSpeed(rate, reply) => (Ok(self.machine.set_speed(rate)), reply),
            Command::Close(_) => return,
        };

        let result = result.map(|actions| self.apply(actions));
        self.publish();
        let _ = reply.send(result);
    }

    fn shutdown(&mut self) {
        let actions = self.machine.close();
        self.apply(actions);
        self.publish();
    }

    fn apply(&mut self, actions: Vec<Action>) {
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            match action {
                Action::Attach { url } => {
                    self.destroy_client();
                    self.generation += 1;
                    let events = ClientEvents::new(self.generation, self.event_tx.clone());
                    match self.backend.attach(&url, events) {
                        Ok(client) => {
                            debug!(generation = self.generation, "Client attached");
                            self.client = Some(client);
                        }
                        Err(e) => {
                            warn!(error = %e, "Client attach failed");
                            queue.extend(self.machine.on_fatal_error(StreamErrorKind::Other));
                        }
                    }
                }
                Action::Destroy => self.destroy_client(),
                Action::ArmTimer => {
                    self.deadline = Some(Instant::now() + self.bootstrap_timeout);
                }
                Action::CancelTimer => self.deadline = None,
                Action::StartLoad => self.with_client(|c| c.start_load()),
                Action::RecoverMedia => self.with_client(|c| c.recover_media_error()),
                Action::SetLevel(level) => self.with_client(|c| c.set_level(level)),
                Action::SetRate(rate) => self.with_client(|c| c.set_rate(rate)),
                Action::Play => self.with_client(|c| c.play()),
                Action::Pause => self.with_client(|c| c.pause()),
            }
        }
    }

    fn with_client(&mut self, f: impl FnOnce(&mut dyn StreamClient)) {
        if let Some(client) = self.client.as_deref_mut() {
            f(client);
        }
    }

    fn destroy_client(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.destroy();
            debug!(generation = self.generation, "Client destroyed");
        }
    }

    fn publish(&self) {
        self.state.send_if_modified(|current| {
            let next = self.machine.snapshot();
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Drop for SessionTask {
    fn drop(&mut self) {
        self.destroy_client();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureReason, Level, Resolution};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        sources: Vec<String>,
        events: Vec<ClientEvents>,
        live: usize,
        calls: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct MockBackend {
        state: Arc<Mutex<Recorded>>,
    }

    impl MockBackend {
        fn attaches(&self) -> usize {
            self.state.lock().unwrap().sources.len()
        }

        fn live(&self) -> usize {
            self.state.lock().unwrap().live
        }

        fn last_source(&self) -> String {
            self.state.lock().unwrap().sources.last().cloned().unwrap()
        }

        fn emit(&self, event: ClientEvent) {
            let state = self.state.lock().unwrap();
            state.events.last().unwrap().emit(event);
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    impl StreamBackend for MockBackend {
        fn attach(&self, source: &str, events: ClientEvents) -> Result<Box<dyn StreamClient>> {
            let mut state = self.state.lock().unwrap();
            state.sources.push(source.to_string());
            state.events.push(events);
            state.live += 1;
            Ok(Box::new(MockClient {
                state: self.state.clone(),
                destroyed: false,
            }))
        }
    }

    struct MockClient {
        state: Arc<Mutex<Recorded>>,
        destroyed: bool,
    }

    impl MockClient {
        fn record(&self, call: &str) {
            self.state.lock().unwrap().calls.push(call.to_string());
        }
    }

    impl StreamClient for MockClient {
        fn start_load(&mut self) {
            self.record("start_load");
        }
        fn recover_media_error(&mut self) {
            self.record("recover");
        }
        fn set_level(&mut self, level: Option<usize>) {
            self.record(&format!("level:{:?}", level));
        }
        fn set_rate(&mut self, rate: f64) {
            self.record(&format!("rate:{}", rate));
        }
        fn play(&mut self) {
            self.record("play");
        }
        fn pause(&mut self) {
            self.record("pause");
        }
        fn destroy(&mut self) {
            if !self.destroyed {
                self.destroyed = true;
                self.state.lock().unwrap().live -= 1;
            }
        }
    }

    fn player(backend: &MockBackend) -> Player {
        Player::new(Arc::new(backend.clone()), PlaybackConfig::default())
    }

    const STREAM: &str = "https://cdn.example.com/live/index.m3u8";

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_stream_escalates_then_fails() {
        let backend = MockBackend::default();
        let mut player = player(&backend);
        let started = Instant::now();
        let handle = player.open_url(STREAM, false).await.unwrap();

        let relayed = handle.wait_for(|s| s.using_relay).await.unwrap();
        assert_eq!(started.elapsed().as_secs(), 12);
        assert_eq!(relayed.status, PlaybackStatus::Connecting);
        assert!(backend.last_source().starts_with("https://corsproxy.io/?"));

        let failed = handle
            .wait_for(|s| s.status == PlaybackStatus::Failed)
            .await
            .unwrap();
        assert_eq!(started.elapsed().as_secs(), 24);
        assert_eq!(failed.failure, Some(FailureReason::StreamUnresponsive));
        assert_eq!(backend.live(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.attaches(), 2);
        assert_eq!(handle.status(), PlaybackStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_connecting() {
        let backend = MockBackend::default();
        let mut player = player(&backend);
        let handle = player.open_url(STREAM, false).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        player.close().await;
        assert_eq!(backend.live(), 0);
        assert_eq!(handle.status(), PlaybackStatus::Closed);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.attaches(), 1);
        assert!(matches!(handle.play().await, Err(Error::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_channels_keeps_one_client() {
        let backend = MockBackend::default();
        let mut player = player(&backend);
        let first = player.open_url("http://a.example/live.m3u8", false).await.unwrap();
        let second = player.open_url("http://b.example/live.m3u8", false).await.unwrap();

        assert_eq!(first.status(), PlaybackStatus::Closed);
        assert_eq!(backend.live(), 1);
        assert_eq!(backend.last_source(), "http://b.example/live.m3u8");
        assert_eq!(player.active().map(|h| h.id()), Some(second.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manifest_enables_quality_controls() {
        let backend = MockBackend::default();
        let mut player = player(&backend);
        let handle = player.open_url(STREAM, false).await.unwrap();
        handle.wait_for(|s| s.status == PlaybackStatus::Connecting).await.unwrap();

        backend.emit(ClientEvent::ManifestParsed {
            levels: vec![
                Level { bandwidth: 800_000, resolution: Some(Resolution::new(640, 360)) },
                Level { bandwidth: 5_000_000, resolution: Some(Resolution::new(1920, 1080)) },
            ],
        });
        let ready = handle
            .wait_for(|s| s.status == PlaybackStatus::Playing)
            .await
            .unwrap();
        assert_eq!(ready.qualities, vec!["Auto", "360p", "1080p"]);

        handle.set_quality("1080p").await.unwrap();
        handle.set_speed(PlaybackRate::OneAndHalf).await.unwrap();
        handle.pause().await.unwrap();
        assert_eq!(handle.status(), PlaybackStatus::Paused);
        assert_eq!(
            backend.calls(),
            vec!["play", "level:Some(1)", "rate:1.5", "pause"]
        );

        // The bootstrap timer was cancelled by the manifest
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!handle.snapshot().using_relay);
        assert_eq!(backend.attaches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_then_relay() {
        let backend = MockBackend::default();
        let mut player = player(&backend);
        let handle = player.open_url(STREAM, false).await.unwrap();

        backend.emit(ClientEvent::Fatal(StreamErrorKind::Network));
        handle.wait_for(|s| s.retry_count == 1).await.unwrap();
        backend.emit(ClientEvent::Fatal(StreamErrorKind::Network));
        handle.wait_for(|s| s.retry_count == 2).await.unwrap();
        backend.emit(ClientEvent::Fatal(StreamErrorKind::Network));
        let relayed = handle.wait_for(|s| s.using_relay).await.unwrap();

        assert_eq!(relayed.retry_count, 0);
        assert_eq!(backend.attaches(), 2);
        assert_eq!(backend.live(), 1);
        assert_eq!(backend.calls(), vec!["start_load", "start_load"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_client_events_are_ignored() {
        let backend = MockBackend::default();
        let mut player = player(&backend);
        let handle = player.open_url(STREAM, false).await.unwrap();

        let stale = backend.state.lock().unwrap().events[0].clone();
        backend.emit(ClientEvent::NativeError);
        handle.wait_for(|s| s.using_relay).await.unwrap();

        stale.emit(ClientEvent::Fatal(StreamErrorKind::Other));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.status(), PlaybackStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_retry_after_failure() {
        let backend = MockBackend::default();
        let mut player = player(&backend);
        let handle = player.open_url(STREAM, false).await.unwrap();

        assert!(matches!(
            handle.retry(RetryMode::Proxy).await,
            Err(Error::InvalidStateTransition { .. })
        ));

        backend.emit(ClientEvent::Fatal(StreamErrorKind::Other));
        handle
            .wait_for(|s| s.failure == Some(FailureReason::UnsupportedFormat))
            .await
            .unwrap();
        assert_eq!(backend.live(), 0);

        handle.retry(RetryMode::Proxy).await.unwrap();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Connecting);
        assert!(snapshot.using_relay);
        assert_eq!(backend.live(), 1);
    }
}
