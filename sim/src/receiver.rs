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

//! In-memory cast receiver and route layer for running the session manager without a device.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::select;
use uuid::Uuid;

use rcast_core::clock::Clock;
use rcast_core::collaborators::RouteChooser;
use rcast_core::definitions::{RemotePlaybackState, RemoteSessionState};
use rcast_core::route_availability::RouteDiscovery;
use rcast_core::transport::{
    CommandRequest, CommandResult, ItemStatus, RouteCommand, RouteDescriptor, RouteTransport, SessionStatus,
    TransportEvent,
};
use rcast_core::{spawn_service, CoordinatorHandle, RouteCapability, ServiceHandle, TransportError};

pub const SIM_ROUTE_ID: &str = "sim-tv";

pub fn sim_tv() -> RouteDescriptor {
    RouteDescriptor::new(SIM_ROUTE_ID, "Simulated TV", RouteCapability::all())
}

struct SimItem {
    id: String,
    state: RemotePlaybackState,
    position_ms: u64,
    duration_ms: u64,
    updated_at_ms: u64,
}

impl SimItem {
    /// Moves the playhead to `now_ms`, finishing the item at its end.
    fn settle(&mut self, now_ms: u64) {
        if self.state == RemotePlaybackState::Playing {
            let elapsed = now_ms.saturating_sub(self.updated_at_ms);
            self.position_ms = self.position_ms.saturating_add(elapsed).min(self.duration_ms);
            if self.position_ms >= self.duration_ms {
                self.state = RemotePlaybackState::Finished;
            }
        }
        self.updated_at_ms = now_ms;
    }

    fn status(&self) -> ItemStatus {
        ItemStatus {
            item_id: self.id.clone(),
            state: self.state,
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
            timestamp_ms: self.updated_at_ms,
        }
    }
}

#[derive(Default)]
struct ReceiverState {
    session_id: Option<String>,
    item: Option<SimItem>,
}

/// Receiver hosting one session with at most one item. Every media it loads lasts
/// `media_duration_ms`. Status changes are pushed to the attached coordinator.
pub struct SimulatedReceiver {
    clock: Arc<dyn Clock>,
    media_duration_ms: u64,
    state: Mutex<ReceiverState>,
    coordinator: OnceLock<CoordinatorHandle>,
}

impl SimulatedReceiver {
    pub fn new(clock: Arc<dyn Clock>, media_duration_ms: u64) -> Self {
        Self {
            clock,
            media_duration_ms,
            state: Mutex::new(ReceiverState::default()),
            coordinator: OnceLock::new(),
        }
    }

    /// Connects the push channel. Only the first handle is kept.
    pub fn attach(&self, coordinator: CoordinatorHandle) {
        if self.coordinator.set(coordinator).is_err() {
            debug!("Receiver already attached");
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.lock().ok()?.session_id.clone()
    }

    /// Pushes the current item's progress, as a receiver does every few seconds.
    pub fn push_progress(&self) {
        let now = self.clock.now_ms();
        let status = {
            let Ok(mut state) = self.state.lock() else { return; };
            let Some(item) = state.item.as_mut() else { return; };
            item.settle(now);
            let status = item.status();
            if status.state == RemotePlaybackState::Finished {
                info!("Receiver finished item {}", status.item_id);
                state.item = None;
            }
            status
        };
        self.push(TransportEvent::ItemStatus(status));
    }

    fn push(&self, event: TransportEvent) {
        let Some(coordinator) = self.coordinator.get() else {
            debug!("No coordinator attached, dropping {:?}", event);
            return;
        };
        if coordinator.push_transport_event(event).is_err() {
            debug!("Coordinator stopped, dropping receiver push");
        }
    }

    fn apply(&self, state: &mut ReceiverState, request: CommandRequest, pushes: &mut Vec<TransportEvent>)
        -> Result<CommandResult, TransportError>
    {
        let now = self.clock.now_ms();
        if let Some(item) = state.item.as_mut() {
            item.settle(now);
        }
        match request.command {
            RouteCommand::StartSession { application_id } => {
                let session_id = Uuid::new_v4().to_string();
                info!("Receiver app {} started session {}", application_id, session_id);
                state.session_id = Some(session_id.clone());
                state.item = None;
                pushes.push(session_event(&session_id, RemoteSessionState::Active));
                return Ok(CommandResult { session_id: Some(session_id), ..Default::default() });
            }
            RouteCommand::GetSessionStatus => {
                let session_id = request.session_id.ok_or_else(|| remote("missing session id"))?;
                let known = state.session_id.as_deref() == Some(session_id.as_str());
                let session_state = if known { RemoteSessionState::Active } else { RemoteSessionState::Invalidated };
                pushes.push(session_event(&session_id, session_state));
                return Ok(CommandResult::default());
            }
            _ => {}
        }

        if state.session_id.is_none() || state.session_id != request.session_id {
            return Err(remote("unknown session"));
        }
        let mut result = CommandResult::default();
        match request.command {
            RouteCommand::EndSession => {
                if let Some(session_id) = state.session_id.take() {
                    info!("Receiver ended session {}", session_id);
                    pushes.push(session_event(&session_id, RemoteSessionState::Ended));
                }
                state.item = None;
            }
            RouteCommand::Play { uri, start_position_ms, .. } => {
                let item = SimItem {
                    id: Uuid::new_v4().to_string(),
                    state: RemotePlaybackState::Playing,
                    position_ms: start_position_ms.min(self.media_duration_ms),
                    duration_ms: self.media_duration_ms,
                    updated_at_ms: now,
                };
                info!("Receiver plays {} as {}", uri, item.id);
                result.item_id = Some(item.id.clone());
                result.item_status = Some(ItemStatus { state: RemotePlaybackState::Buffering, ..item.status() });
                pushes.push(TransportEvent::ItemStatus(item.status()));
                state.item = Some(item);
            }
            RouteCommand::GetStatus => {
                result.item_status = state.item.as_ref().map(SimItem::status);
            }
            command => {
                let item = match state.item.as_mut() {
                    Some(item) if request.item_id.as_deref() == Some(item.id.as_str()) => item,
                    _ => return Err(remote("unknown item")),
                };
                match command {
                    RouteCommand::Pause => item.state = RemotePlaybackState::Paused,
                    RouteCommand::Resume => item.state = RemotePlaybackState::Playing,
                    RouteCommand::Seek { position_ms } => item.position_ms = position_ms.min(item.duration_ms),
                    RouteCommand::Stop => item.state = RemotePlaybackState::Canceled,
                    other => return Err(remote(&format!("unexpected {:?}", other.kind()))),
                }
                pushes.push(TransportEvent::ItemStatus(item.status()));
                if item.state == RemotePlaybackState::Canceled {
                    state.item = None;
                }
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl RouteTransport for SimulatedReceiver {
    async fn send_command(&self, request: CommandRequest) -> Result<CommandResult, TransportError> {
        debug!("Receiver got {:?}", request.command);
        let mut pushes = Vec::new();
        let result = {
            let mut state = self.state.lock().map_err(|_| TransportError::Closed)?;
            self.apply(&mut state, request, &mut pushes)
        };
        for event in pushes {
            self.push(event);
        }
        result
    }
}

fn session_event(session_id: &str, state: RemoteSessionState) -> TransportEvent {
    TransportEvent::SessionStatus(SessionStatus { session_id: session_id.to_string(), state })
}

fn remote(message: &str) -> TransportError {
    TransportError::Remote(message.to_string())
}

/// Pushes receiver progress every `interval` until stopped.
pub fn run_receiver(receiver: Arc<SimulatedReceiver>, interval: Duration) -> ServiceHandle {
    spawn_service(move |mut stop| async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            select! {
                biased;
                _ = stop.signaled() => {
                    debug!("Receiver progress stopped");
                    break;
                }
                _ = ticker.tick() => receiver.push_progress(),
            }
        }
    })
}

/// Picks the first known route able to host the requested receiver.
pub struct SimulatedChooser {
    routes: Vec<RouteDescriptor>,
}

impl SimulatedChooser {
    pub fn new(routes: Vec<RouteDescriptor>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl RouteChooser for SimulatedChooser {
    async fn prompt_device_selection(&self, selector: RouteCapability) -> Option<RouteDescriptor> {
        let route = self.routes.iter().find(|r| r.matches(selector)).cloned();
        match &route {
            Some(route) => info!("Selected route {}", route.name),
            None => info!("No route for {:?}, selection cancelled", selector),
        }
        route
    }

    async fn select_route(&self, route_id: &str) -> Option<RouteDescriptor> {
        self.routes.iter().find(|r| r.id == route_id).cloned()
    }
}

/// Route registry with a fixed set of routes that tests and the console can change.
pub struct SimulatedDiscovery {
    routes: Mutex<Vec<RouteDescriptor>>,
}

impl SimulatedDiscovery {
    pub fn new(routes: Vec<RouteDescriptor>) -> Self {
        Self { routes: Mutex::new(routes) }
    }

    pub fn set_routes(&self, routes: Vec<RouteDescriptor>) {
        if let Ok(mut current) = self.routes.lock() {
            *current = routes;
        }
    }
}

impl RouteDiscovery for SimulatedDiscovery {
    fn start_discovery(&self, selector: RouteCapability) {
        debug!("Discovery started for {:?}", selector);
    }

    fn stop_discovery(&self, selector: RouteCapability) {
        debug!("Discovery stopped for {:?}", selector);
    }

    fn routes(&self) -> Vec<RouteDescriptor> {
        self.routes.lock().map(|r| r.clone()).unwrap_or_default()
    }
}
