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

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};

use crate::clock::Clock;
use crate::collaborators::{MediaInfo, MediaStateListener};
use crate::definitions::{PlayerState, RemotePlaybackState, RemoteSessionState, SessionLifecycle};
use crate::errors::{SessionError, TransportError};
use crate::position_tracker::PositionTracker;
use crate::receiver_profile::ReceiverProfile;
use crate::reconnection::SessionRecord;
use crate::transport::{
    CommandResult, ItemStatus, RouteCommand, RouteDescriptor, RouteTransport, SessionStatus, SessionTransport,
};

/// Media to load on the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    /// URI as the page knows it; used for the duplicate-request check.
    pub uri: String,
    /// URI the receiver should fetch.
    pub resolved_uri: String,
    pub title: Option<String>,
    pub start_position_ms: u64,
}

impl PlaybackRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            resolved_uri: uri.clone(),
            uri,
            title: None,
            start_position_ms: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn starting_at(mut self, position_ms: u64) -> Self {
        self.start_position_ms = position_ms;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Explicit stop from the user or the coordinator.
    Requested,
    /// The item finished or was invalidated on the receiver.
    PlaybackEnded,
    /// The receiver reported the session ended or invalid.
    SessionEnded,
    RouteLost,
    NegotiationFailed,
    ReconnectionTimeout,
}

/// Events a route session queues for the coordinator, drained after every call into it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionStarted { session_id: String },
    /// A reconnected session was confirmed by the receiver.
    SessionConfirmed { session_id: String },
    ItemLoaded { item_id: String, uri: String },
    /// The displayed state changed.
    StateChanged { state: PlayerState },
    PositionChanged { position_ms: u64, duration_ms: u64 },
    Error { message: String },
    /// Emitted once per live session when it is torn down.
    Released { reason: ReleaseReason, remaining_ms: u64 },
}

/// Session with one receiver family on the selected route.
///
/// `remote_state` follows the receiver; `displayed_state` is what the UI shows and moves ahead of
/// the receiver on user commands. A current item id exists only while the remote state is
/// loading, playing or paused.
pub struct RouteSession {
    profile: ReceiverProfile,
    transport: SessionTransport,
    tracker: PositionTracker,
    clock: Arc<dyn Clock>,
    record: SessionRecord,
    near_end_threshold_ms: u64,

    lifecycle: SessionLifecycle,
    session_id: Option<String>,
    current_item_id: Option<String>,
    current_uri: Option<String>,
    title: Option<String>,
    remote_state: PlayerState,
    displayed_state: PlayerState,
    pause_requested: bool,
    listener: Option<Weak<dyn MediaStateListener>>,

    events: VecDeque<SessionEvent>,
}

impl RouteSession {
    pub fn new(
        profile: ReceiverProfile,
        transport: Arc<dyn RouteTransport>,
        clock: Arc<dyn Clock>,
        record: SessionRecord,
        near_end_threshold_ms: u64,
    ) -> Self {
        Self {
            profile,
            transport: SessionTransport::new(transport),
            tracker: PositionTracker::new(clock.clone()),
            clock,
            record,
            near_end_threshold_ms,
            lifecycle: SessionLifecycle::Idle,
            session_id: None,
            current_item_id: None,
            current_uri: None,
            title: None,
            remote_state: PlayerState::Stopped,
            displayed_state: PlayerState::Stopped,
            pause_requested: false,
            listener: None,
            events: VecDeque::new(),
        }
    }

    pub fn profile(&self) -> &ReceiverProfile {
        &self.profile
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        self.lifecycle
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn current_item_id(&self) -> Option<&str> {
        self.current_item_id.as_deref()
    }

    pub fn current_uri(&self) -> Option<&str> {
        self.current_uri.as_deref()
    }

    pub fn remote_state(&self) -> PlayerState {
        self.remote_state
    }

    pub fn displayed_state(&self) -> PlayerState {
        self.displayed_state
    }

    pub fn route(&self) -> Option<&RouteDescriptor> {
        self.transport.route()
    }

    /// A receiver session exists on a selected route.
    pub fn is_active(&self) -> bool {
        self.session_id.is_some() && self.transport.route().is_some()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.lifecycle == SessionLifecycle::Starting && self.session_id.is_some()
    }

    pub fn position_ms(&mut self) -> u64 {
        self.tracker.get_position()
    }

    pub fn duration_ms(&self) -> u64 {
        self.tracker.duration_ms()
    }

    pub fn media_info(&mut self) -> MediaInfo {
        MediaInfo {
            title: self.title.clone(),
            route_name: self.transport.route().map(|r| r.name.clone()),
            position_ms: self.tracker.get_position(),
            duration_ms: self.tracker.duration_ms(),
        }
    }

    pub fn set_listener(&mut self, listener: &Arc<dyn MediaStateListener>) {
        self.listener = Some(Arc::downgrade(listener));
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn listener(&self) -> Option<Arc<dyn MediaStateListener>> {
        self.listener.as_ref()?.upgrade()
    }

    pub fn is_listener(&self, other: &Arc<dyn MediaStateListener>) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|l| Weak::ptr_eq(l, &Arc::downgrade(other)))
    }

    pub fn select_route(&mut self, route: RouteDescriptor) {
        debug!("[{}] route selected: {}", self.profile.id, route.name);
        self.transport.select_route(route);
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Loads `request` on the receiver, starting a session first if there is none.
    ///
    /// A request for the URI already loaded (or being reconnected) is ignored. Failing to start
    /// the session or to load the item releases the session.
    pub async fn request_playback(&mut self, request: PlaybackRequest) -> Result<(), SessionError> {
        let same_uri = self.current_uri.as_deref() == Some(request.uri.as_str());
        if same_uri && (self.current_item_id.is_some() || self.is_reconnecting()) {
            debug!("[{}] {} is already playing", self.profile.id, request.uri);
            return Ok(());
        }
        let Some(route_name) = self.transport.route().map(|r| r.name.clone()) else {
            return Err(SessionError::NegotiationFailed(TransportError::NoRouteSelected));
        };

        if self.session_id.is_none() {
            self.lifecycle = SessionLifecycle::Starting;
            let command = RouteCommand::StartSession {
                application_id: self.profile.application_id.to_string(),
            };
            let session_id = match self.transport.send(command, None, None).await {
                Ok(CommandResult { session_id: Some(id), .. }) => id,
                Ok(_) => {
                    let cause = TransportError::Remote("receiver returned no session id".to_string());
                    return Err(self.fail_negotiation(cause).await);
                }
                Err(e) => return Err(self.fail_negotiation(e).await),
            };
            info!("[{}] session {} started on {}", self.profile.id, session_id, route_name);
            self.session_id = Some(session_id.clone());
            self.lifecycle = SessionLifecycle::Active;
            if let Some(route) = self.transport.route() {
                self.record.save_session(self.profile.id, &session_id, &route.id);
            }
            self.events.push_back(SessionEvent::SessionStarted { session_id });
        } else {
            self.reset_item();
        }

        let command = RouteCommand::Play {
            uri: request.resolved_uri.clone(),
            title: request.title.clone(),
            mime_type: self.profile.mime_type.to_string(),
            start_position_ms: request.start_position_ms,
        };
        let (item_id, initial_status) = match self.transport.send(command, self.session_id.as_deref(), None).await {
            Ok(CommandResult { item_id: Some(item_id), item_status, .. }) => (item_id, item_status),
            Ok(_) => {
                let cause = TransportError::Remote("receiver returned no item id".to_string());
                return Err(self.fail_negotiation(cause).await);
            }
            Err(e) => return Err(self.fail_negotiation(e).await),
        };

        info!("[{}] loaded {} as {}", self.profile.id, request.uri, item_id);
        // The receiver only accepts items on a live session.
        if self.lifecycle == SessionLifecycle::Starting {
            self.lifecycle = SessionLifecycle::Active;
            if let Some(session_id) = self.session_id.clone() {
                self.events.push_back(SessionEvent::SessionConfirmed { session_id });
            }
        }
        self.current_item_id = Some(item_id.clone());
        self.current_uri = Some(request.uri.clone());
        self.title = request.title;
        self.tracker.clear();
        self.tracker.on_position_info_updated(0, request.start_position_ms, self.clock.now_ms());
        self.record.save_uri(&request.uri);
        self.events.push_back(SessionEvent::ItemLoaded { item_id, uri: request.uri });
        if let Some(listener) = self.listener() {
            listener.on_cast_started(&route_name);
        }
        self.remote_state = PlayerState::Loading;
        self.set_displayed(PlayerState::Loading);

        if let Some(status) = initial_status {
            self.on_item_status(status);
        }
        Ok(())
    }

    /// Shows paused at once; the receiver catches up. A failed command is not reverted.
    pub async fn pause(&mut self) {
        let Some(item_id) = self.current_item_id.clone() else {
            debug!("[{}] pause ignored, nothing loaded", self.profile.id);
            return;
        };
        self.pause_requested = true;
        self.tracker.on_paused();
        self.set_displayed(PlayerState::Paused);
        self.send_transient(RouteCommand::Pause, &item_id).await;
    }

    pub async fn resume(&mut self) {
        let Some(item_id) = self.current_item_id.clone() else {
            debug!("[{}] resume ignored, nothing loaded", self.profile.id);
            return;
        };
        self.pause_requested = false;
        self.tracker.on_resumed();
        self.set_displayed(PlayerState::Playing);
        self.send_transient(RouteCommand::Resume, &item_id).await;
    }

    pub async fn seek(&mut self, position_ms: u64) {
        let Some(item_id) = self.current_item_id.clone() else {
            debug!("[{}] seek ignored, nothing loaded", self.profile.id);
            return;
        };
        self.tracker.on_seek(position_ms);
        self.notify_position();
        self.send_transient(RouteCommand::Seek { position_ms }, &item_id).await;
    }

    /// Stops the item and ends the session if there is one, then clears all local state and
    /// associations whatever the receiver answered. Safe to call repeatedly.
    pub async fn release(&mut self) {
        self.teardown(ReleaseReason::Requested, true).await;
    }

    pub async fn release_with_reason(&mut self, reason: ReleaseReason) {
        self.teardown(reason, true).await;
    }

    /// Rebinds to a session that outlived the previous process. The session stays `Starting`
    /// until the receiver confirms it with an active session status or accepts a new item.
    pub async fn begin_reconnect(
        &mut self,
        route: RouteDescriptor,
        session_id: String,
        uri: Option<String>,
    ) -> Result<(), SessionError> {
        info!("[{}] reconnecting to session {} on {}", self.profile.id, session_id, route.name);
        self.transport.select_route(route);
        self.session_id = Some(session_id.clone());
        self.lifecycle = SessionLifecycle::Starting;
        self.current_uri = uri;
        match self.transport.send(RouteCommand::GetSessionStatus, Some(&session_id), None).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("[{}] reconnection to {} failed: {}", self.profile.id, session_id, e);
                self.teardown(ReleaseReason::ReconnectionTimeout, false).await;
                Err(SessionError::NegotiationFailed(e))
            }
        }
    }

    /// Drops an unconfirmed reconnection locally. Returns false if nothing was pending.
    pub async fn abandon_reconnect(&mut self) -> bool {
        if !self.is_reconnecting() {
            return false;
        }
        info!("[{}] reconnection not confirmed in time", self.profile.id);
        self.teardown(ReleaseReason::ReconnectionTimeout, false).await;
        true
    }

    /// Ends the session if it ran on `route_id`. Returns whether it did.
    pub async fn on_route_lost(&mut self, route_id: &str) -> bool {
        if self.transport.route().map(|r| r.id.as_str()) != Some(route_id) {
            return false;
        }
        warn!("[{}] route {} lost", self.profile.id, route_id);
        self.transport.clear_route();
        self.teardown(ReleaseReason::RouteLost, false).await;
        true
    }

    pub async fn on_session_status(&mut self, status: SessionStatus) {
        if self.session_id.as_deref() != Some(status.session_id.as_str()) {
            debug!("[{}] dropping status of session {}", self.profile.id, status.session_id);
            return;
        }
        match status.state {
            RemoteSessionState::Ended | RemoteSessionState::Invalidated => {
                info!("[{}] session {} ended by receiver", self.profile.id, status.session_id);
                self.teardown(ReleaseReason::SessionEnded, false).await;
            }
            RemoteSessionState::Active => {
                let confirming = self.lifecycle == SessionLifecycle::Starting;
                if confirming {
                    self.lifecycle = SessionLifecycle::Active;
                    self.events.push_back(SessionEvent::SessionConfirmed { session_id: status.session_id });
                }
                self.sync_status(confirming).await;
            }
        }
    }

    pub fn on_item_status(&mut self, status: ItemStatus) {
        if self.current_item_id.as_deref() != Some(status.item_id.as_str()) {
            debug!("[{}] dropping status of item {}", self.profile.id, status.item_id);
            return;
        }
        let state = self.map_remote_state(&status);
        self.tracker.on_position_info_updated(status.duration_ms, status.position_ms, status.timestamp_ms);

        // A playing status right after a pause request predates it.
        let displayed = if self.pause_requested && matches!(state, PlayerState::Playing | PlayerState::Loading) {
            PlayerState::Paused
        } else {
            state
        };
        self.pause_requested = false;
        self.tracker.set_playing(displayed == PlayerState::Playing);
        if state == PlayerState::Finished {
            self.tracker.on_finished();
        }

        let position_ms = self.tracker.get_position();
        self.record.save_progress(state, position_ms, self.tracker.duration_ms(), self.clock.now_ms());
        self.notify_position();

        if !state.is_item_active() {
            self.current_item_id = None;
        }
        if state == PlayerState::Error {
            let message = format!("Playback error on {}", self.route_name());
            error!("[{}] {}", self.profile.id, message);
            if let Some(listener) = self.listener() {
                listener.on_error(&message);
            }
            self.events.push_back(SessionEvent::Error { message });
        }
        self.remote_state = state;
        self.set_displayed(displayed);
    }

    fn map_remote_state(&self, status: &ItemStatus) -> PlayerState {
        match status.state {
            RemotePlaybackState::Pending | RemotePlaybackState::Buffering => PlayerState::Loading,
            RemotePlaybackState::Playing => PlayerState::Playing,
            RemotePlaybackState::Paused if self.is_at_end(status) => PlayerState::Finished,
            RemotePlaybackState::Paused => PlayerState::Paused,
            RemotePlaybackState::Finished | RemotePlaybackState::Canceled => PlayerState::Finished,
            RemotePlaybackState::Invalidated => PlayerState::Invalidated,
            RemotePlaybackState::Error => PlayerState::Error,
        }
    }

    fn is_at_end(&self, status: &ItemStatus) -> bool {
        status.duration_ms > 0
            && status.duration_ms.saturating_sub(status.position_ms) < self.near_end_threshold_ms
    }

    async fn sync_status(&mut self, adopt_item: bool) {
        let result = self
            .transport
            .send(RouteCommand::GetStatus, self.session_id.as_deref(), self.current_item_id.as_deref())
            .await;
        match result {
            Ok(CommandResult { item_status: Some(status), .. }) => {
                if adopt_item && self.current_item_id.is_none() && self.map_remote_state(&status).is_item_active() {
                    info!("[{}] resuming item {}", self.profile.id, status.item_id);
                    self.current_item_id = Some(status.item_id.clone());
                }
                self.on_item_status(status);
            }
            Ok(_) => {}
            Err(e) => warn!("[{}] status sync failed: {}", self.profile.id, e),
        }
    }

    async fn send_transient(&self, command: RouteCommand, item_id: &str) {
        let kind = command.kind();
        if let Err(e) = self.transport.send(command, self.session_id.as_deref(), Some(item_id)).await {
            warn!("[{}] {:?} failed, keeping local state: {}", self.profile.id, kind, e);
        }
    }

    async fn fail_negotiation(&mut self, cause: TransportError) -> SessionError {
        error!("[{}] cannot start remote playback: {}", self.profile.id, cause);
        let message = format!("Unable to cast to {}", self.route_name());
        if let Some(listener) = self.listener() {
            listener.on_error(&message);
        }
        self.events.push_back(SessionEvent::Error { message });
        self.teardown(ReleaseReason::NegotiationFailed, true).await;
        SessionError::NegotiationFailed(cause)
    }

    async fn teardown(&mut self, reason: ReleaseReason, notify_receiver: bool) {
        let was_live = self.session_id.is_some() || self.lifecycle != SessionLifecycle::Idle;
        let remaining_ms = self.tracker.duration_ms().saturating_sub(self.tracker.get_position());
        let session_id = self.session_id.take();
        let item_id = self.current_item_id.take();

        if let (true, Some(session)) = (notify_receiver, session_id.as_deref()) {
            self.lifecycle = SessionLifecycle::Ending;
            if item_id.is_some() {
                if let Err(e) = self.transport.send(RouteCommand::Stop, Some(session), item_id.as_deref()).await {
                    warn!("[{}] stop failed during release: {}", self.profile.id, e);
                }
            }
            if let Err(e) = self.transport.send(RouteCommand::EndSession, Some(session), None).await {
                warn!("[{}] end session failed during release: {}", self.profile.id, e);
            }
        }

        self.lifecycle = SessionLifecycle::Idle;
        self.current_uri = None;
        self.title = None;
        self.pause_requested = false;
        self.tracker.clear();
        self.remote_state = PlayerState::Stopped;
        self.displayed_state = PlayerState::Stopped;
        let listener = self.listener.take().and_then(|l| l.upgrade());
        self.transport.clear_route();

        if was_live {
            info!("[{}] session {:?} released ({:?})", self.profile.id, session_id, reason);
            self.record.clear();
            self.events.push_back(SessionEvent::Released { reason, remaining_ms });
            if let Some(listener) = listener {
                listener.on_cast_stopped();
            }
        }
    }

    fn reset_item(&mut self) {
        self.current_item_id = None;
        self.current_uri = None;
        self.pause_requested = false;
        self.tracker.clear();
        self.remote_state = PlayerState::Stopped;
    }

    fn set_displayed(&mut self, state: PlayerState) {
        if self.displayed_state == state {
            return;
        }
        debug!("[{}] {:?} -> {:?}", self.profile.id, self.displayed_state, state);
        self.displayed_state = state;
        self.events.push_back(SessionEvent::StateChanged { state });
        if let Some(listener) = self.listener() {
            listener.on_playback_state_changed(state);
        }
    }

    fn notify_position(&mut self) {
        let position_ms = self.tracker.get_position();
        let duration_ms = self.tracker.duration_ms();
        self.events.push_back(SessionEvent::PositionChanged { position_ms, duration_ms });
        if let Some(listener) = self.listener() {
            listener.on_position_changed(position_ms, duration_ms);
        }
    }

    fn route_name(&self) -> String {
        self.transport
            .route()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| "remote device".to_string())
    }
}
