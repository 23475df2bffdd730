// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::collaborators::{
    LogMetricsSink, MediaStateListener, MemorySettingsStore, MetricEvent, MetricsSink, PassthroughUrlResolver,
    RouteChooser, SettingsStore, TransportControl, UrlResolver,
};
use crate::config::CoordinatorConfig;
use crate::coordinator_events::CoordinatorEvent;
use crate::definitions::PlayerState;
use crate::errors::SessionError;
use crate::observers::{ObserverRegistry, ObserverToken};
use crate::receiver_profile::ReceiverProfile;
use crate::reconnection::{PendingReconnection, ReconnectionPolicy, SessionRecord};
use crate::route_availability::{RouteAvailabilityListener, RouteAvailabilityTracker, RouteDiscovery, RouteRegistryEvent};
use crate::route_session::{PlaybackRequest, ReleaseReason, RouteSession, SessionEvent};
use crate::transport::{RouteTransport, TransportEvent};

/// External services the coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn RouteTransport>,
    pub chooser: Arc<dyn RouteChooser>,
    pub discovery: Arc<dyn RouteDiscovery>,
    pub settings: Arc<dyn SettingsStore>,
    pub resolver: Arc<dyn UrlResolver>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// In-memory settings, pass-through URL resolution, metrics to the log and the system clock.
    pub fn new(
        transport: Arc<dyn RouteTransport>,
        chooser: Arc<dyn RouteChooser>,
        discovery: Arc<dyn RouteDiscovery>,
    ) -> Self {
        Self {
            transport,
            chooser,
            discovery,
            settings: Arc::new(MemorySettingsStore::new()),
            resolver: Arc::new(PassthroughUrlResolver),
            metrics: Arc::new(LogMetricsSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn UrlResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Token of a route availability listener, scoped to the profile it was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityRegistration {
    pub profile: &'static str,
    pub token: ObserverToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPosition {
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// Owns one route session per receiver profile and arbitrates which one is current.
///
/// At most one session is live at a time. The current session owns the transport controls;
/// every state change of it is fanned out to all registered controls.
pub struct SessionCoordinator {
    sessions: Vec<RouteSession>,
    availability: Vec<RouteAvailabilityTracker>,
    current: Option<usize>,

    controls: ObserverRegistry<dyn TransportControl>,
    controls_shown: bool,

    chooser: Arc<dyn RouteChooser>,
    resolver: Arc<dyn UrlResolver>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    record: SessionRecord,

    policy: ReconnectionPolicy,
    pending: Option<PendingReconnection>,

    event_tx: broadcast::Sender<CoordinatorEvent>,
}

impl SessionCoordinator {
    pub fn new(collaborators: Collaborators, profiles: &[ReceiverProfile], config: CoordinatorConfig) -> Self {
        let record = SessionRecord::new(collaborators.settings.clone());
        let sessions = profiles
            .iter()
            .map(|profile| {
                RouteSession::new(
                    *profile,
                    collaborators.transport.clone(),
                    collaborators.clock.clone(),
                    record.clone(),
                    config.near_end_threshold_ms,
                )
            })
            .collect();
        let availability = profiles
            .iter()
            .map(|profile| RouteAvailabilityTracker::new(profile.selector, collaborators.discovery.clone()))
            .collect();
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        Self {
            sessions,
            availability,
            current: None,
            controls: ObserverRegistry::new(),
            controls_shown: false,
            chooser: collaborators.chooser,
            resolver: collaborators.resolver,
            metrics: collaborators.metrics,
            clock: collaborators.clock,
            record,
            policy: ReconnectionPolicy::new(config.reconnection),
            pending: None,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.event_tx.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<CoordinatorEvent> {
        self.event_tx.clone()
    }

    pub fn current_profile(&self) -> Option<&'static str> {
        self.current.map(|idx| self.sessions[idx].profile().id)
    }

    pub fn current_session(&self) -> Option<&RouteSession> {
        self.current.map(|idx| &self.sessions[idx])
    }

    pub fn sessions(&self) -> &[RouteSession] {
        &self.sessions
    }

    pub fn position(&mut self) -> Option<PlaybackPosition> {
        let idx = self.current?;
        let session = &mut self.sessions[idx];
        Some(PlaybackPosition {
            position_ms: session.position_ms(),
            duration_ms: session.duration_ms(),
        })
    }

    pub fn position_ms(&mut self) -> Option<u64> {
        self.position().map(|p| p.position_ms)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.current_session().map(RouteSession::duration_ms)
    }

    fn session_index_for(&self, uri: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.profile().handles(uri))
    }

    fn session_index_of(&self, profile: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.profile().id == profile)
    }

    /// Casts the listener's media. An active session of the matching profile takes the new item
    /// over without prompting; otherwise any other live session is released and the user is
    /// asked to pick a route.
    pub async fn request_remote_playback(&mut self, listener: Arc<dyn MediaStateListener>) -> Result<(), SessionError> {
        let uri = listener.source_uri();
        let Some(idx) = self.session_index_for(&uri) else {
            warn!("No receiver handles {}", uri);
            listener.on_error("No cast receiver can play this media");
            return Err(SessionError::NoMatchingReceiver(uri));
        };

        let cookies = listener.cookies();
        let user_agent = listener.user_agent();
        let resolved = self.resolver.resolve(&uri, cookies.as_deref(), user_agent.as_deref()).await;
        if !resolved.playable {
            warn!("{} cannot be played remotely", uri);
            listener.on_error("This media cannot be played remotely");
            return Err(SessionError::MediaNotPlayable(uri));
        }
        let request = PlaybackRequest {
            uri,
            resolved_uri: resolved.uri,
            title: listener.title(),
            start_position_ms: listener.start_position_ms(),
        };

        if self.sessions[idx].is_active() {
            info!("[{}] new media takes over the cast device", self.sessions[idx].profile().id);
            self.make_current(idx);
            self.sessions[idx].set_listener(&listener);
            let result = self.sessions[idx].request_playback(request).await;
            self.dispatch_events(idx).await;
            return result;
        }

        if let Some(previous) = self.current.filter(|c| *c != idx) {
            self.release_session(previous, ReleaseReason::Requested).await;
        }
        self.sessions[idx].set_listener(&listener);
        let selector = self.sessions[idx].profile().selector;
        let Some(route) = self.chooser.prompt_device_selection(selector).await else {
            info!("Route selection cancelled");
            self.sessions[idx].clear_listener();
            return Err(SessionError::SelectionCancelled);
        };
        self.sessions[idx].select_route(route);
        self.make_current(idx);
        let result = self.sessions[idx].request_playback(request).await;
        self.dispatch_events(idx).await;
        result
    }

    /// Shows the controls again for the page that owns the current cast. Only an exact listener
    /// match counts, so a page holding on to a stale session cannot grab them.
    pub fn request_remote_playback_control(&mut self, listener: &Arc<dyn MediaStateListener>) -> bool {
        let Some(idx) = self.current else {
            return false;
        };
        let session = &self.sessions[idx];
        if !session.is_active() || !session.is_listener(listener) {
            debug!("Control request from a page that does not own the cast");
            return false;
        }
        let state = session.displayed_state();
        if !state.is_item_active() {
            return false;
        }
        self.show_controls(idx, state);
        true
    }

    pub fn add_transport_control(&mut self, control: Arc<dyn TransportControl>) -> ObserverToken {
        if self.controls_shown {
            if let Some(idx) = self.current {
                let state = self.sessions[idx].displayed_state();
                let media = self.sessions[idx].media_info();
                control.show(state, &media);
            }
        }
        self.controls.add(control)
    }

    pub fn remove_transport_control(&mut self, token: ObserverToken) -> bool {
        let Some(control) = self.controls.remove(token) else {
            return false;
        };
        if self.controls_shown {
            control.hide();
        }
        true
    }

    /// Registers for availability of routes able to play `uri`. None if no profile handles it.
    pub fn add_route_availability_listener(
        &mut self,
        uri: &str,
        listener: Arc<dyn RouteAvailabilityListener>,
    ) -> Option<AvailabilityRegistration> {
        let idx = self.session_index_for(uri)?;
        let token = self.availability[idx].add_listener(listener);
        Some(AvailabilityRegistration {
            profile: self.sessions[idx].profile().id,
            token,
        })
    }

    pub fn remove_route_availability_listener(&mut self, registration: AvailabilityRegistration) -> bool {
        match self.session_index_of(registration.profile) {
            Some(idx) => self.availability[idx].remove_listener(registration.token),
            None => false,
        }
    }

    pub fn set_reconnect_enabled(&self, enabled: bool) {
        self.record.set_reconnect_enabled(enabled);
    }

    pub async fn pause(&mut self) -> Result<(), SessionError> {
        let idx = self.current.ok_or(SessionError::NoActiveSession)?;
        self.sessions[idx].pause().await;
        self.dispatch_events(idx).await;
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), SessionError> {
        let idx = self.current.ok_or(SessionError::NoActiveSession)?;
        self.sessions[idx].resume().await;
        self.dispatch_events(idx).await;
        Ok(())
    }

    pub async fn seek(&mut self, position_ms: u64) -> Result<(), SessionError> {
        let idx = self.current.ok_or(SessionError::NoActiveSession)?;
        self.sessions[idx].seek(position_ms).await;
        self.dispatch_events(idx).await;
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), SessionError> {
        let idx = self.current.ok_or(SessionError::NoActiveSession)?;
        self.release_session(idx, ReleaseReason::Requested).await;
        Ok(())
    }

    /// Routes a receiver push to the session it belongs to by session or item id.
    pub async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::SessionStatus(status) => {
                let Some(idx) = self.sessions.iter().position(|s| s.session_id() == Some(status.session_id.as_str()))
                else {
                    debug!("Dropping status of unknown session {}", status.session_id);
                    return;
                };
                self.sessions[idx].on_session_status(status).await;
                self.dispatch_events(idx).await;
            }
            TransportEvent::ItemStatus(status) => {
                let Some(idx) = self
                    .sessions
                    .iter()
                    .position(|s| s.current_item_id() == Some(status.item_id.as_str()))
                else {
                    debug!("Dropping status of unknown item {}", status.item_id);
                    return;
                };
                self.sessions[idx].on_item_status(status);
                self.dispatch_events(idx).await;
            }
        }
    }

    pub async fn on_route_event(&mut self, event: RouteRegistryEvent) {
        for (idx, tracker) in self.availability.iter_mut().enumerate() {
            if let Some(available) = tracker.on_registry_event(&event) {
                let profile = self.sessions[idx].profile().id;
                debug!("[{}] routes available: {}", profile, available);
                let _ = self.event_tx.send(CoordinatorEvent::RouteAvailabilityChanged { profile, available });
            }
        }
        if let Some(route_id) = event.lost_route_id() {
            for idx in 0..self.sessions.len() {
                if self.sessions[idx].on_route_lost(route_id).await {
                    self.dispatch_events(idx).await;
                }
            }
        }
    }

    /// Resumes the persisted session if it is worth it. Returns whether an attempt started.
    pub async fn try_reconnect(&mut self) -> bool {
        if self.current.is_some() {
            return false;
        }
        let persisted = self.record.load();
        if !self.policy.should_reconnect(persisted.as_ref(), self.clock.now_ms()) {
            debug!("No session to reconnect to");
            return false;
        }
        let Some(persisted) = persisted else {
            return false;
        };
        let Some(idx) = persisted.profile.as_deref().and_then(|p| self.session_index_of(p)) else {
            debug!("Persisted session has no known receiver profile");
            return false;
        };
        let Some(route_id) = persisted.route_id.as_deref() else {
            return false;
        };
        let profile = self.sessions[idx].profile().id;
        let Some(route) = self.chooser.select_route(route_id).await else {
            info!("[{}] route {} is no longer there", profile, route_id);
            return false;
        };
        self.metrics.record(MetricEvent::ReconnectionAttempted { profile });

        self.make_current(idx);
        self.pending = Some(self.policy.begin(idx, persisted.session_id.clone()));
        let _ = self.event_tx.send(CoordinatorEvent::ReconnectionStarted {
            profile,
            session_id: persisted.session_id.clone(),
        });
        let result = self.sessions[idx]
            .begin_reconnect(route, persisted.session_id, persisted.uri)
            .await;
        self.dispatch_events(idx).await;
        result.is_ok()
    }

    pub fn reconnection_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Gives up on a reconnection the receiver did not confirm in time.
    pub async fn on_reconnection_timeout(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        warn!("Session {} was not confirmed in time", pending.session_id);
        let idx = pending.session_index;
        if self.sessions[idx].abandon_reconnect().await {
            self.dispatch_events(idx).await;
        }
    }

    async fn release_session(&mut self, idx: usize, reason: ReleaseReason) {
        self.sessions[idx].release_with_reason(reason).await;
        self.dispatch_events(idx).await;
    }

    fn make_current(&mut self, idx: usize) {
        if self.current == Some(idx) {
            return;
        }
        self.hide_controls();
        self.current = Some(idx);
        let profile = Some(self.sessions[idx].profile().id);
        let _ = self.event_tx.send(CoordinatorEvent::CurrentChanged { profile });
    }

    async fn dispatch_events(&mut self, idx: usize) {
        loop {
            let events = self.sessions[idx].drain_events();
            if events.is_empty() {
                break;
            }
            let mut release = None;
            for event in events {
                if let Some(reason) = self.handle_session_event(idx, event) {
                    release = Some(reason);
                }
            }
            if let Some(reason) = release {
                self.sessions[idx].release_with_reason(reason).await;
            }
        }
    }

    /// Applies one session event. Returns a reason when the session must be released.
    fn handle_session_event(&mut self, idx: usize, event: SessionEvent) -> Option<ReleaseReason> {
        let profile = self.sessions[idx].profile().id;
        let is_current = self.current == Some(idx);
        match event {
            SessionEvent::SessionStarted { session_id } => {
                self.metrics.record(MetricEvent::CastStarted { profile });
                let _ = self.event_tx.send(CoordinatorEvent::SessionStarted { profile, session_id });
            }
            SessionEvent::SessionConfirmed { session_id } => {
                if self.pending.as_ref().is_some_and(|p| p.is_confirmed_by(idx, &session_id)) {
                    info!("[{}] reconnected to session {}", profile, session_id);
                    self.pending = None;
                    self.metrics.record(MetricEvent::ReconnectionSucceeded { profile });
                    let _ = self.event_tx.send(CoordinatorEvent::ReconnectionSucceeded { profile, session_id });
                }
            }
            SessionEvent::ItemLoaded { item_id, uri } => {
                debug!("[{}] item {} is {}", profile, item_id, uri);
            }
            SessionEvent::StateChanged { state } => {
                let _ = self.event_tx.send(CoordinatorEvent::StateChanged { profile, state });
                if state == PlayerState::Error {
                    self.metrics.record(MetricEvent::PlaybackError { profile });
                }
                if is_current && state.is_item_active() {
                    self.show_controls(idx, state);
                }
                if state.is_terminal() {
                    return Some(ReleaseReason::PlaybackEnded);
                }
            }
            SessionEvent::PositionChanged { .. } => {}
            SessionEvent::Error { message } => {
                if is_current {
                    for control in self.controls.snapshot() {
                        control.set_error(&message);
                    }
                }
                let _ = self.event_tx.send(CoordinatorEvent::PlaybackError { profile, message });
            }
            SessionEvent::Released { reason, remaining_ms } => {
                self.metrics.record(match reason {
                    ReleaseReason::RouteLost => MetricEvent::RouteLost { profile, remaining_ms },
                    ReleaseReason::NegotiationFailed => MetricEvent::NegotiationFailed { profile },
                    ReleaseReason::ReconnectionTimeout => MetricEvent::ReconnectionTimedOut { profile },
                    _ => MetricEvent::CastEnded { profile, remaining_ms },
                });
                if self.pending.as_ref().is_some_and(|p| p.session_index == idx) {
                    self.pending = None;
                }
                let _ = self.event_tx.send(CoordinatorEvent::SessionReleased { profile, reason });
                if is_current {
                    self.hide_controls();
                    self.current = None;
                    let _ = self.event_tx.send(CoordinatorEvent::CurrentChanged { profile: None });
                }
            }
        }
        None
    }

    fn show_controls(&mut self, idx: usize, state: PlayerState) {
        let media = self.sessions[idx].media_info();
        for control in self.controls.snapshot() {
            control.show(state, &media);
        }
        self.controls_shown = true;
    }

    fn hide_controls(&mut self) {
        if !self.controls_shown {
            return;
        }
        for control in self.controls.snapshot() {
            control.hide();
        }
        self.controls_shown = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::definitions::RemotePlaybackState;
    use crate::definitions::{RemoteSessionState, SessionLifecycle};
    use crate::receiver_profile::BUILTIN_PROFILES;
    use crate::test_support::{
        living_room_tv, ControlCall, ListenerCall, MockChooser, MockTransport, RecordingControl, RecordingListener,
        RecordingMetrics, StaticDiscovery,
    };
    use crate::transport::{CommandKind, ItemStatus, RouteCommand, RouteDescriptor, SessionStatus};
    use proptest::prelude::*;
    use std::sync::Mutex;

    const DEFAULT: &str = "default_media_receiver";
    const STREAMING: &str = "media_streaming";
    const MOVIE: &str = "https://example.com/a.mp4";
    const OTHER_MOVIE: &str = "https://example.com/b.mp4";
    const LIVE: &str = "https://example.com/live/master.m3u8?token=1";

    struct Fixture {
        coordinator: SessionCoordinator,
        transport: Arc<MockTransport>,
        chooser: Arc<MockChooser>,
        discovery: Arc<StaticDiscovery>,
        settings: Arc<MemorySettingsStore>,
        metrics: Arc<RecordingMetrics>,
        clock: Arc<ManualClock>,
        control: Arc<RecordingControl>,
    }

    fn fixture_picking(route: Option<RouteDescriptor>) -> Fixture {
        let transport = MockTransport::new();
        let chooser = MockChooser::picking(route);
        let discovery = Arc::new(StaticDiscovery::default());
        let settings = Arc::new(MemorySettingsStore::new());
        let metrics = Arc::new(RecordingMetrics::default());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let collaborators = Collaborators::new(transport.clone(), chooser.clone(), discovery.clone())
            .with_settings(settings.clone())
            .with_metrics(metrics.clone())
            .with_clock(clock.clone());
        let mut coordinator = SessionCoordinator::new(collaborators, BUILTIN_PROFILES, CoordinatorConfig::default());
        let control = RecordingControl::new();
        coordinator.add_transport_control(control.clone());
        Fixture { coordinator, transport, chooser, discovery, settings, metrics, clock, control }
    }

    fn fixture() -> Fixture {
        fixture_picking(Some(living_room_tv()))
    }

    fn page(uri: &str) -> (Arc<RecordingListener>, Arc<dyn MediaStateListener>) {
        let page = RecordingListener::new(uri);
        let listener: Arc<dyn MediaStateListener> = page.clone();
        (page, listener)
    }

    fn item(item_id: &str, state: RemotePlaybackState, position_ms: u64, duration_ms: u64, ts: u64) -> TransportEvent {
        TransportEvent::ItemStatus(ItemStatus {
            item_id: item_id.to_string(),
            state,
            position_ms,
            duration_ms,
            timestamp_ms: ts,
        })
    }

    fn active_sessions(coordinator: &SessionCoordinator) -> usize {
        coordinator.sessions().iter().filter(|s| s.is_active()).count()
    }

    /// Casts MOVIE and lets the receiver report it playing from the start.
    async fn playing(f: &mut Fixture, listener: &Arc<dyn MediaStateListener>) {
        f.coordinator.request_remote_playback(listener.clone()).await.unwrap();
        let now = f.clock.now_ms();
        f.coordinator
            .on_transport_event(item("item-1", RemotePlaybackState::Playing, 0, 60_000, now))
            .await;
        f.transport.take();
        f.control.take();
        f.metrics.take();
    }

    #[derive(Default)]
    struct RecordingAvailability {
        seen: Mutex<Vec<bool>>,
    }

    impl RecordingAvailability {
        fn take(&self) -> Vec<bool> {
            std::mem::take(&mut self.seen.lock().unwrap())
        }
    }

    impl RouteAvailabilityListener for RecordingAvailability {
        fn on_route_availability_changed(&self, available: bool) {
            self.seen.lock().unwrap().push(available);
        }
    }

    #[tokio::test]
    async fn cast_prompts_for_route_and_starts_session() {
        let mut f = fixture();
        let (page, listener) = page(MOVIE);
        f.coordinator.request_remote_playback(listener.clone()).await.unwrap();

        assert_eq!(f.chooser.prompts(), 1);
        assert_eq!(f.coordinator.current_profile(), Some(DEFAULT));
        assert_eq!(f.transport.kinds(), vec![CommandKind::StartSession, CommandKind::Play]);
        assert_eq!(f.control.take(), vec![ControlCall::Show(PlayerState::Loading)]);
        assert_eq!(f.metrics.take(), vec![MetricEvent::CastStarted { profile: DEFAULT }]);
        assert_eq!(page.take()[0], ListenerCall::CastStarted("Living Room TV".into()));
    }

    #[tokio::test]
    async fn manifests_go_to_the_streaming_receiver() {
        let mut f = fixture();
        let (_page, listener) = page(LIVE);
        f.coordinator.request_remote_playback(listener.clone()).await.unwrap();

        assert_eq!(f.coordinator.current_profile(), Some(STREAMING));
        let sent = f.transport.take();
        assert_eq!(
            sent[0].command,
            RouteCommand::StartSession { application_id: "5A1BC0D9".into() }
        );
        match &sent[1].command {
            RouteCommand::Play { mime_type, title, .. } => {
                assert_eq!(mime_type, "application/x-mpegurl");
                assert_eq!(title.as_deref(), Some("Big Buck Bunny"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn unplayable_media_is_refused_before_prompting() {
        let mut f = fixture();
        let (page, listener) = page("ftp://example.com/a.mp4");
        let result = f.coordinator.request_remote_playback(listener.clone()).await;

        assert!(matches!(result, Err(SessionError::MediaNotPlayable(_))));
        assert_eq!(f.chooser.prompts(), 0);
        assert!(matches!(page.take().as_slice(), [ListenerCall::Error(_)]));
        assert_eq!(f.coordinator.current_profile(), None);
    }

    #[tokio::test]
    async fn cancelled_selection_leaves_nothing_behind() {
        let mut f = fixture_picking(None);
        let (_page, listener) = page(MOVIE);
        let result = f.coordinator.request_remote_playback(listener.clone()).await;

        assert_eq!(result, Err(SessionError::SelectionCancelled));
        assert!(f.transport.kinds().is_empty());
        assert_eq!(f.coordinator.current_profile(), None);
        assert!(f.coordinator.sessions().iter().all(|s| s.listener().is_none()));
    }

    #[tokio::test]
    async fn negotiation_failure_is_shown_and_recorded() {
        let mut f = fixture();
        f.transport.fail(CommandKind::StartSession);
        let (page, listener) = page(MOVIE);
        let result = f.coordinator.request_remote_playback(listener.clone()).await;

        assert!(matches!(result, Err(SessionError::NegotiationFailed(_))));
        assert!(matches!(f.control.take().as_slice(), [ControlCall::Error(_)]));
        assert_eq!(f.metrics.take(), vec![MetricEvent::NegotiationFailed { profile: DEFAULT }]);
        assert_eq!(f.coordinator.current_profile(), None);
        assert_eq!(page.take().last(), Some(&ListenerCall::CastStopped));
    }

    #[tokio::test]
    async fn active_session_takes_over_new_media_without_prompt() {
        let mut f = fixture();
        let (_first, first) = page(MOVIE);
        let (_second, second) = page(OTHER_MOVIE);
        playing(&mut f, &first).await;

        f.coordinator.request_remote_playback(second.clone()).await.unwrap();

        assert_eq!(f.chooser.prompts(), 1);
        assert_eq!(f.transport.kinds(), vec![CommandKind::Play]);
        assert!(f.coordinator.request_remote_playback_control(&second));
        assert!(!f.coordinator.request_remote_playback_control(&first));
    }

    #[tokio::test]
    async fn switching_receivers_releases_the_previous_session() {
        let mut f = fixture();
        let (first_page, first) = page(MOVIE);
        let (_second_page, second) = page(LIVE);
        playing(&mut f, &first).await;

        f.coordinator.request_remote_playback(second.clone()).await.unwrap();

        assert_eq!(
            f.transport.kinds(),
            vec![CommandKind::Stop, CommandKind::EndSession, CommandKind::StartSession, CommandKind::Play]
        );
        assert_eq!(f.chooser.prompts(), 2);
        assert_eq!(active_sessions(&f.coordinator), 1);
        assert_eq!(f.coordinator.current_profile(), Some(STREAMING));
        assert_eq!(first_page.take().last(), Some(&ListenerCall::CastStopped));
        assert_eq!(f.control.take(), vec![ControlCall::Hide, ControlCall::Show(PlayerState::Loading)]);
    }

    #[tokio::test]
    async fn control_request_needs_the_exact_listener() {
        let mut f = fixture();
        let (_page, listener) = page(MOVIE);
        let (_stranger_page, stranger) = page(MOVIE);
        playing(&mut f, &listener).await;

        assert!(!f.coordinator.request_remote_playback_control(&stranger));
        assert!(f.control.take().is_empty());
        assert!(f.coordinator.request_remote_playback_control(&listener));
        assert_eq!(f.control.take(), vec![ControlCall::Show(PlayerState::Playing)]);
    }

    #[tokio::test]
    async fn state_changes_fan_out_to_every_control() {
        let mut f = fixture();
        let (_page, listener) = page(MOVIE);
        f.coordinator.request_remote_playback(listener.clone()).await.unwrap();
        f.control.take();

        let late = RecordingControl::new();
        let token = f.coordinator.add_transport_control(late.clone());
        assert_eq!(late.take(), vec![ControlCall::Show(PlayerState::Loading)]);

        f.coordinator.pause().await.unwrap();
        assert_eq!(f.control.take(), vec![ControlCall::Show(PlayerState::Paused)]);
        assert_eq!(late.take(), vec![ControlCall::Show(PlayerState::Paused)]);

        assert!(f.coordinator.remove_transport_control(token));
        assert!(!f.coordinator.remove_transport_control(token));
        assert_eq!(late.take(), vec![ControlCall::Hide]);

        f.coordinator.stop().await.unwrap();
        assert_eq!(f.control.take(), vec![ControlCall::Hide]);
        assert!(late.take().is_empty());
    }

    #[tokio::test]
    async fn finished_item_releases_session_and_hides_controls() {
        let mut f = fixture();
        let (page, listener) = page(MOVIE);
        playing(&mut f, &listener).await;
        let now = f.clock.now_ms();
        f.coordinator
            .on_transport_event(item("item-1", RemotePlaybackState::Finished, 60_000, 60_000, now))
            .await;

        assert_eq!(f.transport.kinds(), vec![CommandKind::EndSession]);
        assert_eq!(f.control.take(), vec![ControlCall::Hide]);
        assert_eq!(f.metrics.take(), vec![MetricEvent::CastEnded { profile: DEFAULT, remaining_ms: 0 }]);
        assert_eq!(f.coordinator.current_profile(), None);
        assert_eq!(page.take().last(), Some(&ListenerCall::CastStopped));
    }

    #[tokio::test]
    async fn remote_error_reaches_controls() {
        let mut f = fixture();
        let (_page, listener) = page(MOVIE);
        playing(&mut f, &listener).await;
        let now = f.clock.now_ms();
        f.coordinator
            .on_transport_event(item("item-1", RemotePlaybackState::Error, 1_000, 60_000, now))
            .await;

        assert!(matches!(f.control.take().as_slice(), [ControlCall::Error(_)]));
        assert_eq!(f.metrics.take(), vec![MetricEvent::PlaybackError { profile: DEFAULT }]);
    }

    #[tokio::test]
    async fn updates_for_unknown_items_are_dropped() {
        let mut f = fixture();
        let (_page, listener) = page(MOVIE);
        playing(&mut f, &listener).await;
        let now = f.clock.now_ms();
        f.coordinator
            .on_transport_event(item("item-2", RemotePlaybackState::Finished, 0, 0, now))
            .await;

        assert_eq!(f.coordinator.current_session().map(|s| s.remote_state()), Some(PlayerState::Playing));
        assert!(f.control.take().is_empty());
    }

    #[tokio::test]
    async fn receiver_ending_the_session_releases_it_once() {
        let mut f = fixture();
        let (page, listener) = page(MOVIE);
        playing(&mut f, &listener).await;
        let ended = TransportEvent::SessionStatus(SessionStatus {
            session_id: "session-1".into(),
            state: RemoteSessionState::Ended,
        });
        f.coordinator.on_transport_event(ended.clone()).await;
        f.coordinator.on_transport_event(ended).await;

        assert!(f.transport.kinds().is_empty());
        assert_eq!(f.metrics.take(), vec![MetricEvent::CastEnded { profile: DEFAULT, remaining_ms: 60_000 }]);
        let stops = page.take().into_iter().filter(|c| *c == ListenerCall::CastStopped).count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn lost_route_ends_the_session() {
        let mut f = fixture();
        let (_page, listener) = page(MOVIE);
        playing(&mut f, &listener).await;
        f.clock.advance(10_000);

        f.coordinator
            .on_route_event(RouteRegistryEvent::RouteUnselected { route_id: "living-room".into() })
            .await;

        assert!(f.transport.kinds().is_empty());
        assert_eq!(
            f.metrics.take(),
            vec![MetricEvent::RouteLost { profile: DEFAULT, remaining_ms: 50_000 }]
        );
        assert_eq!(f.control.take(), vec![ControlCall::Hide]);
        assert_eq!(active_sessions(&f.coordinator), 0);
    }

    #[tokio::test]
    async fn position_follows_the_current_session() {
        let mut f = fixture();
        let (_page, listener) = page(MOVIE);
        assert_eq!(f.coordinator.position(), None);
        playing(&mut f, &listener).await;

        f.clock.advance(3_000);
        assert_eq!(f.coordinator.position_ms(), Some(3_000));
        f.coordinator.seek(30_000).await.unwrap();
        assert_eq!(
            f.coordinator.position(),
            Some(PlaybackPosition { position_ms: 30_000, duration_ms: 60_000 })
        );
    }

    #[tokio::test]
    async fn commands_without_a_session_are_rejected() {
        let mut f = fixture();
        assert_eq!(f.coordinator.pause().await, Err(SessionError::NoActiveSession));
        assert_eq!(f.coordinator.stop().await, Err(SessionError::NoActiveSession));
        assert!(f.transport.kinds().is_empty());
    }

    #[tokio::test]
    async fn availability_listeners_see_current_value_and_changes() {
        let mut f = fixture();
        f.discovery.routes.lock().unwrap().push(living_room_tv());
        let mut events = f.coordinator.subscribe();
        let listener = Arc::new(RecordingAvailability::default());

        let registration = f
            .coordinator
            .add_route_availability_listener(MOVIE, listener.clone())
            .unwrap();
        assert_eq!(registration.profile, DEFAULT);
        assert_eq!(listener.take(), vec![true]);

        f.discovery.routes.lock().unwrap().clear();
        f.coordinator
            .on_route_event(RouteRegistryEvent::RouteRemoved { route_id: "living-room".into() })
            .await;
        assert_eq!(listener.take(), vec![false]);
        assert_eq!(
            events.try_recv().unwrap(),
            CoordinatorEvent::RouteAvailabilityChanged { profile: DEFAULT, available: false }
        );

        assert!(f.coordinator.remove_route_availability_listener(registration));
        assert!(!f.coordinator.remove_route_availability_listener(registration));
    }

    fn persist(f: &Fixture, state: PlayerState) {
        let record = SessionRecord::new(f.settings.clone());
        record.save_session(DEFAULT, "session-7", "living-room");
        record.save_uri(MOVIE);
        record.save_progress(state, 10_000, 60_000, f.clock.now_ms());
    }

    #[tokio::test]
    async fn persisted_session_is_resumed() {
        let mut f = fixture();
        persist(&f, PlayerState::Playing);
        let now = f.clock.now_ms();
        f.transport.reply_to_status_with(ItemStatus {
            item_id: "item-7".into(),
            state: RemotePlaybackState::Playing,
            position_ms: 12_000,
            duration_ms: 60_000,
            timestamp_ms: now,
        });

        assert!(f.coordinator.try_reconnect().await);
        assert_eq!(f.transport.kinds(), vec![CommandKind::GetSessionStatus]);
        assert!(f.coordinator.reconnection_deadline().is_some());
        assert_eq!(f.coordinator.current_profile(), Some(DEFAULT));

        f.coordinator
            .on_transport_event(TransportEvent::SessionStatus(SessionStatus {
                session_id: "session-7".into(),
                state: RemoteSessionState::Active,
            }))
            .await;

        assert!(f.coordinator.reconnection_deadline().is_none());
        assert_eq!(
            f.metrics.take(),
            vec![
                MetricEvent::ReconnectionAttempted { profile: DEFAULT },
                MetricEvent::ReconnectionSucceeded { profile: DEFAULT },
            ]
        );
        assert_eq!(f.control.take(), vec![ControlCall::Show(PlayerState::Playing)]);
        assert_eq!(f.coordinator.position_ms(), Some(12_000));
    }

    #[tokio::test]
    async fn finished_session_is_not_resumed() {
        let mut f = fixture();
        persist(&f, PlayerState::Finished);

        assert!(!f.coordinator.try_reconnect().await);
        assert!(f.transport.kinds().is_empty());
        assert!(f.metrics.take().is_empty());
    }

    #[tokio::test]
    async fn disabled_reconnection_is_respected() {
        let mut f = fixture();
        persist(&f, PlayerState::Paused);
        f.coordinator.set_reconnect_enabled(false);

        assert!(!f.coordinator.try_reconnect().await);
        assert!(f.transport.kinds().is_empty());
    }

    #[tokio::test]
    async fn unconfirmed_reconnection_is_abandoned_quietly() {
        let mut f = fixture();
        persist(&f, PlayerState::Paused);
        let (_page, listener) = page(MOVIE);
        assert!(f.coordinator.try_reconnect().await);

        f.coordinator.on_reconnection_timeout().await;

        assert_eq!(
            f.metrics.take(),
            vec![
                MetricEvent::ReconnectionAttempted { profile: DEFAULT },
                MetricEvent::ReconnectionTimedOut { profile: DEFAULT },
            ]
        );
        assert_eq!(f.transport.kinds(), vec![CommandKind::GetSessionStatus]);
        assert!(f.control.take().is_empty());
        assert_eq!(f.coordinator.current_profile(), None);
        assert!(SessionRecord::new(f.settings.clone()).load().is_none());
        assert!(!f.coordinator.request_remote_playback_control(&listener));
    }

    #[tokio::test]
    async fn vanished_route_is_not_counted_as_an_attempt() {
        let mut f = fixture_picking(None);
        persist(&f, PlayerState::Paused);

        assert!(!f.coordinator.try_reconnect().await);
        assert!(f.metrics.take().is_empty());
        assert!(f.transport.kinds().is_empty());
        assert_eq!(f.coordinator.current_profile(), None);
    }

    #[tokio::test]
    async fn new_media_during_reconnection_survives_the_timeout() {
        let mut f = fixture();
        persist(&f, PlayerState::Paused);
        assert!(f.coordinator.try_reconnect().await);
        f.transport.take();

        let (_page, listener) = page(OTHER_MOVIE);
        f.coordinator.request_remote_playback(listener.clone()).await.unwrap();
        assert_eq!(f.chooser.prompts(), 0);
        assert!(f.coordinator.reconnection_deadline().is_none());

        f.coordinator.on_reconnection_timeout().await;

        let session = f.coordinator.current_session().unwrap();
        assert_eq!(session.session_id(), Some("session-7"));
        assert_eq!(session.current_item_id(), Some("item-1"));
        assert_eq!(session.lifecycle(), SessionLifecycle::Active);
        assert_eq!(f.transport.kinds(), vec![CommandKind::Play]);
        assert_eq!(
            f.metrics.take(),
            vec![
                MetricEvent::ReconnectionAttempted { profile: DEFAULT },
                MetricEvent::ReconnectionSucceeded { profile: DEFAULT },
            ]
        );
        assert!(f.coordinator.request_remote_playback_control(&listener));
    }

    proptest! {
        #[test]
        fn at_most_one_session_is_live(requests in prop::collection::vec(0usize..4, 1..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let mut f = fixture();
                let mut pages = Vec::new();
                for request in requests {
                    match request {
                        0 => { let _ = f.coordinator.stop().await; }
                        n => {
                            let uri = [MOVIE, OTHER_MOVIE, LIVE][n - 1];
                            let (_page, listener) = page(uri);
                            f.coordinator.request_remote_playback(listener.clone()).await.unwrap();
                            pages.push(listener);
                        }
                    }
                    let live: Vec<usize> = f
                        .coordinator
                        .sessions()
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| s.is_active())
                        .map(|(i, _)| i)
                        .collect();
                    assert!(live.len() <= 1);
                    if let Some(idx) = live.first() {
                        assert_eq!(f.coordinator.current_profile(), Some(BUILTIN_PROFILES[*idx].id));
                    }
                }
            });
        }
    }
}
