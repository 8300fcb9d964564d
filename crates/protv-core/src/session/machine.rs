//! Playback session state machine
//!
//! Every external event is a named transition on one [`SessionMachine`].
//! Transitions never perform I/O; they return the [`Action`]s the driver
//! must carry out against the streaming client and the bootstrap timer.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::StreamErrorKind;
use crate::{
    config::PlaybackConfig,
    types::{FailureReason, Level, PlaybackRate, PlaybackStatus, RetryMode, SessionId},
    Error, Result,
};

/// Label for adaptive bitrate selection
pub const AUTO_QUALITY: &str = "Auto";

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Tear down any current client and attach a new one to `url`
    Attach { url: String },
    /// Ask the current client to resume loading in place
    StartLoad,
    /// Ask the current client to run its decode recovery
    RecoverMedia,
    /// Tear down the current client
    Destroy,
    /// (Re)arm the bootstrap timer
    ArmTimer,
    CancelTimer,
    Play,
    Pause,
    /// Pin a level ordinal, or `None` for adaptive selection
    SetLevel(Option<usize>),
    SetRate(f64),
}

/// Observable session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub status: PlaybackStatus,
    pub failure: Option<FailureReason>,
    /// URL handed to the streaming client
    pub source_url: String,
    /// Shown as the "using secure proxy" indicator
    pub using_relay: bool,
    pub retry_count: u32,
    /// `["Auto", "360p", ...]`, empty until a manifest is parsed
    pub qualities: Vec<String>,
    pub quality: String,
    pub rate: PlaybackRate,
}

/// State for one playback session
#[derive(Debug)]
pub struct SessionMachine {
    id: SessionId,
    config: PlaybackConfig,
    stream_url: String,
    source_url: String,
    using_relay: bool,
    retry_count: u32,
    media_recoveries: u32,
    status: PlaybackStatus,
    failure: Option<FailureReason>,
    qualities: Vec<String>,
    quality: String,
    rate: PlaybackRate,
    timer_armed: bool,
}

impl SessionMachine {
    /// Create a session for `stream_url`; `force_relay` starts in relay mode
    pub fn new(stream_url: impl Into<String>, config: PlaybackConfig, force_relay: bool) -> Self {
        let stream_url = stream_url.into();
        let using_relay = force_relay && config.relay_prefix.is_some();
        Self {
            id: SessionId::new(),
            config,
            source_url: stream_url.clone(),
            stream_url,
            using_relay,
            retry_count: 0,
            media_recoveries: 0,
            status: PlaybackStatus::Connecting,
            failure: None,
            qualities: Vec::new(),
            quality: AUTO_QUALITY.to_string(),
            rate: PlaybackRate::Normal,
            timer_armed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    pub fn using_relay(&self) -> bool {
        self.using_relay
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn qualities(&self) -> &[String] {
        &self.qualities
    }

    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            status: self.status,
            failure: self.failure,
            source_url: self.source_url.clone(),
            using_relay: self.using_relay,
            retry_count: self.retry_count,
            qualities: self.qualities.clone(),
            quality: self.quality.clone(),
            rate: self.rate,
        }
    }

    /// Initial bootstrap on open
    pub fn start(&mut self) -> Vec<Action> {
        self.bootstrap()
    }

    /// Manifest parsed by the streaming client
    pub fn on_manifest_parsed(&mut self, levels: &[Level]) -> Vec<Action> {
        if self.status.is_terminal() {
            return Vec::new();
        }

        self.qualities = std::iter::once(AUTO_QUALITY.to_string())
            .chain(levels.iter().map(Level::label))
            .collect();
        debug!(qualities = ?self.qualities, "Manifest parsed");

        let mut actions = self.cancel_timer();
        if self.status == PlaybackStatus::Connecting {
            if self.config.autoplay {
                self.transition(PlaybackStatus::Playing);
                actions.push(Action::Play);
            } else {
                self.transition(PlaybackStatus::Paused);
            }
        }
        actions
    }

    /// Bootstrap timer expired
    pub fn on_timeout(&mut self) -> Vec<Action> {
        if !self.timer_armed || self.status != PlaybackStatus::Connecting {
            return Vec::new();
        }
        self.timer_armed = false;
        warn!(using_relay = self.using_relay, "Stream bootstrap timed out");
        self.escalate_or_fail(FailureReason::StreamUnresponsive)
    }

    /// Media element started rendering
    pub fn on_playing(&mut self) -> Vec<Action> {
        match self.status {
            PlaybackStatus::Connecting | PlaybackStatus::Buffering | PlaybackStatus::Paused => {
                self.transition(PlaybackStatus::Playing);
                self.cancel_timer()
            }
            _ => Vec::new(),
        }
    }

    /// Media element stalled waiting for data
    pub fn on_waiting(&mut self) -> Vec<Action> {
        if self.status == PlaybackStatus::Playing {
            self.transition(PlaybackStatus::Buffering);
        }
        Vec::new()
    }

    /// Fatal error reported by the streaming client
    pub fn on_fatal_error(&mut self, kind: StreamErrorKind) -> Vec<Action> {
        if self.status.is_terminal() {
            return Vec::new();
        }

        match kind {
            StreamErrorKind::Network => {
                if self.retry_count < self.config.max_network_retries {
                    self.retry_count += 1;
                    info!(retry = self.retry_count, "Transport error, resuming load");
                    vec![Action::StartLoad]
                } else {
                    self.escalate_or_fail(FailureReason::ServerNotResponding)
                }
            }
            StreamErrorKind::Media => {
                if self.media_recoveries < self.config.max_media_recoveries {
                    self.media_recoveries += 1;
                    info!(attempt = self.media_recoveries, "Decode error, recovering in place");
                    vec![Action::RecoverMedia]
                } else {
                    self.fail(FailureReason::MediaDecodeFailed)
                }
            }
            StreamErrorKind::Other => self.fail(FailureReason::UnsupportedFormat),
        }
    }

    /// Error from the non-adaptive playback path
    pub fn on_native_error(&mut self) -> Vec<Action> {
        if self.status.is_terminal() {
            return Vec::new();
        }
        self.escalate_or_fail(FailureReason::NativePlaybackFailed)
    }

    /// Manual retry from `Failed`
    pub fn retry(&mut self, mode: RetryMode) -> Result<Vec<Action>> {
        if self.status != PlaybackStatus::Failed {
            return Err(self.invalid(PlaybackStatus::Connecting));
        }

        match mode {
            RetryMode::Standard => self.using_relay = false,
            RetryMode::Proxy => {
                if self.config.relay_prefix.is_none() {
                    return Err(Error::InvalidConfig("no relay prefix configured".into()));
                }
                self.using_relay = true;
            }
        }
        self.retry_count = 0;
        info!(mode = ?mode, "Manual retry");
        Ok(self.bootstrap())
    }

    pub fn play(&mut self) -> Result<Vec<Action>> {
        match self.status {
            PlaybackStatus::Playing => Ok(Vec::new()),
            PlaybackStatus::Paused => {
                self.transition(PlaybackStatus::Playing);
                Ok(vec![Action::Play])
            }
            _ => Err(self.invalid(PlaybackStatus::Playing)),
        }
    }

    pub fn pause(&mut self) -> Result<Vec<Action>> {
        match self.status {
            PlaybackStatus::Paused => Ok(Vec::new()),
            PlaybackStatus::Playing | PlaybackStatus::Buffering => {
                self.transition(PlaybackStatus::Paused);
                Ok(vec![Action::Pause])
            }
            _ => Err(self.invalid(PlaybackStatus::Paused)),
        }
    }

    /// Select `Auto` or one of the advertised quality labels.
    /// Unrecognized labels are ignored.
    pub fn set_quality(&mut self, label: &str) -> Vec<Action> {
        if label == AUTO_QUALITY {
            self.quality = AUTO_QUALITY.to_string();
            return vec![Action::SetLevel(None)];
        }

        match self.qualities.iter().position(|q| q == label) {
            Some(pos) if pos >= 1 => {
                self.quality = label.to_string();
                vec![Action::SetLevel(Some(pos - 1))]
            }
            _ => {
                debug!(label, "Ignoring unknown quality");
                Vec::new()
            }
        }
    }

    pub fn set_speed(&mut self, rate: PlaybackRate) -> Vec<Action> {
        self.rate = rate;
        vec![Action::SetRate(rate.as_f64())]
    }

    /// Tear down unconditionally
    pub fn close(&mut self) -> Vec<Action> {
        if self.status == PlaybackStatus::Closed {
            return Vec::new();
        }
        self.transition(PlaybackStatus::Closed);
        let mut actions = self.cancel_timer();
        actions.push(Action::Destroy);
        actions
    }

    fn bootstrap(&mut self) -> Vec<Action> {
        self.source_url = if self.using_relay {
            self.config
                .relay_url(&self.stream_url)
                .unwrap_or_else(|| self.stream_url.clone())
        } else {
            self.stream_url.clone()
        };
        self.media_recoveries = 0;
        self.failure = None;
        self.qualities.clear();
        self.quality = AUTO_QUALITY.to_string();
        self.timer_armed = true;
        self.transition(PlaybackStatus::Connecting);

        let mut actions = vec![
            Action::Attach {
                url: self.source_url.clone(),
            },
            Action::ArmTimer,
        ];
        if self.rate != PlaybackRate::Normal {
            actions.push(Action::SetRate(self.rate.as_f64()));
        }
        actions
    }

    fn escalate_or_fail(&mut self, reason: FailureReason) -> Vec<Action> {
        if !self.using_relay && self.config.relay_prefix.is_some() {
            self.using_relay = true;
            self.retry_count = 0;
            info!(reason = ?reason, "Escalating to relay");
            self.bootstrap()
        } else {
            self.fail(reason)
        }
    }

    fn fail(&mut self, reason: FailureReason) -> Vec<Action> {
        warn!(reason = ?reason, using_relay = self.using_relay, "Playback failed");
        self.failure = Some(reason);
        self.transition(PlaybackStatus::Failed);
        self.timer_armed = false;
        vec![Action::CancelTimer, Action::Destroy]
    }

    fn cancel_timer(&mut self) -> Vec<Action> {
        if self.timer_armed {
            self.timer_armed = false;
            vec![Action::CancelTimer]
        } else {
            Vec::new()
        }
    }

    fn transition(&mut self, to: PlaybackStatus) {
        let from = self.status;
        if !from.can_transition_to(to) {
            warn!(from = %from, to = %to, "Ignoring invalid state transition");
            return;
        }
        self.status = to;
        if from != to {
            info!(session_id = %self.id, from = %from, to = %to, "State transition");
        }
    }

    fn invalid(&self, to: PlaybackStatus) -> Error {
        Error::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resolution;

    fn machine() -> SessionMachine {
        let mut m = SessionMachine::new("https://cdn.example.com/live.m3u8", PlaybackConfig::default(), false);
        m.start();
        m
    }

    fn levels() -> Vec<Level> {
        vec![
            Level { bandwidth: 800_000, resolution: Some(Resolution::new(640, 360)) },
            Level { bandwidth: 2_800_000, resolution: Some(Resolution::new(1280, 720)) },
        ]
    }

    #[test]
    fn test_start_attaches_raw_url_and_arms_timer() {
        let mut m = SessionMachine::new("https://cdn.example.com/live.m3u8", PlaybackConfig::default(), false);
        let actions = m.start();
        assert_eq!(
            actions,
            vec![
                Action::Attach { url: "https://cdn.example.com/live.m3u8".into() },
                Action::ArmTimer
            ]
        );
        assert_eq!(m.status(), PlaybackStatus::Connecting);
        assert!(m.timer_armed());
    }

    #[test]
    fn test_manifest_parsed_starts_playback() {
        let mut m = machine();
        let actions = m.on_manifest_parsed(&levels());
        assert_eq!(actions, vec![Action::CancelTimer, Action::Play]);
        assert_eq!(m.status(), PlaybackStatus::Playing);
        assert_eq!(m.qualities(), ["Auto", "360p", "720p"]);
    }

    #[test]
    fn test_manifest_without_autoplay_pauses() {
        let config = PlaybackConfig { autoplay: false, ..Default::default() };
        let mut m = SessionMachine::new("http://s/live.m3u8", config, false);
        m.start();
        assert_eq!(m.on_manifest_parsed(&[]), vec![Action::CancelTimer]);
        assert_eq!(m.status(), PlaybackStatus::Paused);
        assert_eq!(m.qualities(), ["Auto"]);
    }

    #[test]
    fn test_timeout_escalates_then_fails() {
        let mut m = machine();
        let actions = m.on_timeout();
        assert!(m.using_relay());
        assert_eq!(m.status(), PlaybackStatus::Connecting);
        assert!(m.source_url().starts_with("https://corsproxy.io/?https%3A%2F%2F"));
        assert!(matches!(actions[0], Action::Attach { .. }));
        assert_eq!(actions[1], Action::ArmTimer);

        let actions = m.on_timeout();
        assert_eq!(m.status(), PlaybackStatus::Failed);
        assert_eq!(m.failure(), Some(FailureReason::StreamUnresponsive));
        assert_eq!(actions, vec![Action::CancelTimer, Action::Destroy]);

        // A late expiry is a no-op
        assert!(m.on_timeout().is_empty());
    }

    #[test]
    fn test_timeout_after_ready_is_ignored() {
        let mut m = machine();
        m.on_manifest_parsed(&levels());
        assert!(m.on_timeout().is_empty());
        assert!(!m.using_relay());
    }

    #[test]
    fn test_network_retry_ceiling() {
        let mut m = machine();
        assert_eq!(m.on_fatal_error(StreamErrorKind::Network), vec![Action::StartLoad]);
        assert_eq!(m.retry_count(), 1);
        assert_eq!(m.on_fatal_error(StreamErrorKind::Network), vec![Action::StartLoad]);
        assert_eq!(m.retry_count(), 2);
        assert!(!m.using_relay());

        let actions = m.on_fatal_error(StreamErrorKind::Network);
        assert!(m.using_relay());
        assert_eq!(m.retry_count(), 0);
        assert!(matches!(actions[0], Action::Attach { .. }));

        m.on_fatal_error(StreamErrorKind::Network);
        m.on_fatal_error(StreamErrorKind::Network);
        m.on_fatal_error(StreamErrorKind::Network);
        assert_eq!(m.status(), PlaybackStatus::Failed);
        assert_eq!(m.failure(), Some(FailureReason::ServerNotResponding));
    }

    #[test]
    fn test_media_recovery_is_bounded() {
        let mut m = machine();
        for _ in 0..3 {
            assert_eq!(m.on_fatal_error(StreamErrorKind::Media), vec![Action::RecoverMedia]);
        }
        m.on_fatal_error(StreamErrorKind::Media);
        assert_eq!(m.failure(), Some(FailureReason::MediaDecodeFailed));
    }

    #[test]
    fn test_other_error_is_terminal() {
        let mut m = machine();
        let actions = m.on_fatal_error(StreamErrorKind::Other);
        assert_eq!(actions, vec![Action::CancelTimer, Action::Destroy]);
        assert_eq!(m.failure(), Some(FailureReason::UnsupportedFormat));
        assert!(!m.using_relay());
    }

    #[test]
    fn test_native_error_ladder() {
        let mut m = machine();
        m.on_native_error();
        assert!(m.using_relay());
        assert_eq!(m.status(), PlaybackStatus::Connecting);
        m.on_native_error();
        assert_eq!(m.failure(), Some(FailureReason::NativePlaybackFailed));
    }

    #[test]
    fn test_no_relay_configured_fails_immediately() {
        let config = PlaybackConfig { relay_prefix: None, ..Default::default() };
        let mut m = SessionMachine::new("http://s/live.m3u8", config, true);
        m.start();
        assert!(!m.using_relay());
        m.on_timeout();
        assert_eq!(m.status(), PlaybackStatus::Failed);
        assert!(matches!(m.retry(RetryMode::Proxy), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_manual_retries() {
        let mut m = machine();
        assert!(matches!(m.retry(RetryMode::Standard), Err(Error::InvalidStateTransition { .. })));

        m.on_fatal_error(StreamErrorKind::Other);
        m.retry(RetryMode::Proxy).unwrap();
        assert!(m.using_relay());
        assert_eq!(m.status(), PlaybackStatus::Connecting);
        assert!(m.failure().is_none());

        m.on_fatal_error(StreamErrorKind::Other);
        let actions = m.retry(RetryMode::Standard).unwrap();
        assert!(!m.using_relay());
        assert_eq!(
            actions[0],
            Action::Attach { url: "https://cdn.example.com/live.m3u8".into() }
        );
    }

    #[test]
    fn test_quality_selection() {
        let mut m = machine();
        m.on_manifest_parsed(&levels());
        assert_eq!(m.set_quality("720p"), vec![Action::SetLevel(Some(1))]);
        assert_eq!(m.snapshot().quality, "720p");
        assert_eq!(m.set_quality("Auto"), vec![Action::SetLevel(None)]);
        assert!(m.set_quality("1080p").is_empty());
        assert_eq!(m.snapshot().quality, "Auto");
    }

    #[test]
    fn test_play_pause_buffering() {
        let mut m = machine();
        assert!(m.pause().is_err());
        m.on_manifest_parsed(&levels());
        m.on_waiting();
        assert_eq!(m.status(), PlaybackStatus::Buffering);
        m.on_playing();
        assert_eq!(m.status(), PlaybackStatus::Playing);
        assert_eq!(m.pause().unwrap(), vec![Action::Pause]);
        assert_eq!(m.play().unwrap(), vec![Action::Play]);
    }

    #[test]
    fn test_speed_survives_rebuild() {
        let mut m = machine();
        assert_eq!(m.set_speed(PlaybackRate::Double), vec![Action::SetRate(2.0)]);
        let actions = m.on_timeout();
        assert_eq!(actions.last(), Some(&Action::SetRate(2.0)));
    }

    #[test]
    fn test_quality_pin_cleared_on_rebuild() {
        let mut m = machine();
        m.on_manifest_parsed(&levels());
        m.set_quality("720p");
        assert_eq!(m.snapshot().quality, "720p");

        m.on_native_error();
        assert!(m.using_relay());
        let snapshot = m.snapshot();
        assert_eq!(snapshot.quality, AUTO_QUALITY);
        assert!(snapshot.qualities.is_empty());
    }

    #[test]
    fn test_failure_always_cancels_timer() {
        let mut m = machine();
        m.on_manifest_parsed(&levels());
        assert!(!m.timer_armed());
        let actions = m.on_fatal_error(StreamErrorKind::Other);
        assert_eq!(actions, vec![Action::CancelTimer, Action::Destroy]);
    }

    #[test]
    fn test_close_is_final() {
        let mut m = machine();
        assert_eq!(m.close(), vec![Action::CancelTimer, Action::Destroy]);
        assert_eq!(m.status(), PlaybackStatus::Closed);
        assert!(m.close().is_empty());
        assert!(m.on_timeout().is_empty());
        assert!(m.on_fatal_error(StreamErrorKind::Network).is_empty());
        assert!(m.on_manifest_parsed(&levels()).is_empty());
    }
}
