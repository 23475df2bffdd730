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

//! Mock collaborators shared by the route session and coordinator tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::collaborators::{MediaInfo, MediaStateListener, MetricEvent, MetricsSink, RouteChooser, TransportControl};
use crate::definitions::{PlayerState, RouteCapability};
use crate::errors::TransportError;
use crate::route_availability::RouteDiscovery;
use crate::transport::{CommandKind, CommandRequest, CommandResult, ItemStatus, RouteDescriptor, RouteTransport};

/// Records every command and answers with sequential session and item ids.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<CommandRequest>>,
    failing: Mutex<HashSet<CommandKind>>,
    status_reply: Mutex<Option<ItemStatus>>,
    next_session: AtomicU32,
    next_item: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, kind: CommandKind) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn recover(&self, kind: CommandKind) {
        self.failing.lock().unwrap().remove(&kind);
    }

    pub fn reply_to_status_with(&self, status: ItemStatus) {
        *self.status_reply.lock().unwrap() = Some(status);
    }

    pub fn kinds(&self) -> Vec<CommandKind> {
        self.calls.lock().unwrap().iter().map(|c| c.command.kind()).collect()
    }

    pub fn take(&self) -> Vec<CommandRequest> {
        std::mem::take(&mut self.calls.lock().unwrap())
    }
}

#[async_trait]
impl RouteTransport for MockTransport {
    async fn send_command(&self, request: CommandRequest) -> Result<CommandResult, TransportError> {
        let kind = request.command.kind();
        self.calls.lock().unwrap().push(request);
        if self.failing.lock().unwrap().contains(&kind) {
            return Err(TransportError::Remote(format!("{:?} failed", kind)));
        }
        let mut result = CommandResult::default();
        match kind {
            CommandKind::StartSession => {
                let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
                result.session_id = Some(format!("session-{}", n));
            }
            CommandKind::Play => {
                let n = self.next_item.fetch_add(1, Ordering::SeqCst) + 1;
                result.item_id = Some(format!("item-{}", n));
            }
            CommandKind::GetStatus => {
                result.item_status = self.status_reply.lock().unwrap().clone();
            }
            _ => {}
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListenerCall {
    CastStarted(String),
    State(PlayerState),
    Position(u64, u64),
    Error(String),
    CastStopped,
}

pub struct RecordingListener {
    uri: String,
    calls: Mutex<Vec<ListenerCall>>,
}

impl RecordingListener {
    pub fn new(uri: &str) -> Arc<Self> {
        Arc::new(Self {
            uri: uri.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn take(&self) -> Vec<ListenerCall> {
        std::mem::take(&mut self.calls.lock().unwrap())
    }

    pub fn states(&self) -> Vec<PlayerState> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                ListenerCall::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

impl MediaStateListener for RecordingListener {
    fn source_uri(&self) -> String {
        self.uri.clone()
    }

    fn title(&self) -> Option<String> {
        Some("Big Buck Bunny".to_string())
    }

    fn on_cast_started(&self, route_name: &str) {
        self.calls.lock().unwrap().push(ListenerCall::CastStarted(route_name.to_string()));
    }

    fn on_playback_state_changed(&self, state: PlayerState) {
        self.calls.lock().unwrap().push(ListenerCall::State(state));
    }

    fn on_position_changed(&self, position_ms: u64, duration_ms: u64) {
        self.calls.lock().unwrap().push(ListenerCall::Position(position_ms, duration_ms));
    }

    fn on_error(&self, message: &str) {
        self.calls.lock().unwrap().push(ListenerCall::Error(message.to_string()));
    }

    fn on_cast_stopped(&self) {
        self.calls.lock().unwrap().push(ListenerCall::CastStopped);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCall {
    Show(PlayerState),
    Hide,
    Error(String),
}

#[derive(Default)]
pub struct RecordingControl {
    calls: Mutex<Vec<ControlCall>>,
}

impl RecordingControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<ControlCall> {
        std::mem::take(&mut self.calls.lock().unwrap())
    }
}

impl TransportControl for RecordingControl {
    fn show(&self, state: PlayerState, _media: &MediaInfo) {
        self.calls.lock().unwrap().push(ControlCall::Show(state));
    }

    fn hide(&self) {
        self.calls.lock().unwrap().push(ControlCall::Hide);
    }

    fn set_error(&self, message: &str) {
        self.calls.lock().unwrap().push(ControlCall::Error(message.to_string()));
    }
}

/// Chooser that picks a fixed route, or cancels when none is set.
pub struct MockChooser {
    route: Mutex<Option<RouteDescriptor>>,
    prompts: AtomicU32,
}

impl MockChooser {
    pub fn picking(route: Option<RouteDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            route: Mutex::new(route),
            prompts: AtomicU32::new(0),
        })
    }

    pub fn prompts(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteChooser for MockChooser {
    async fn prompt_device_selection(&self, _selector: RouteCapability) -> Option<RouteDescriptor> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.route.lock().unwrap().clone()
    }

    async fn select_route(&self, route_id: &str) -> Option<RouteDescriptor> {
        self.route.lock().unwrap().clone().filter(|r| r.id == route_id)
    }
}

#[derive(Default)]
pub struct StaticDiscovery {
    pub routes: Mutex<Vec<RouteDescriptor>>,
}

impl RouteDiscovery for StaticDiscovery {
    fn start_discovery(&self, _selector: RouteCapability) {}

    fn stop_discovery(&self, _selector: RouteCapability) {}

    fn routes(&self) -> Vec<RouteDescriptor> {
        self.routes.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetrics {
    pub fn take(&self) -> Vec<MetricEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

impl MetricsSink for RecordingMetrics {
    fn record(&self, event: MetricEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn living_room_tv() -> RouteDescriptor {
    RouteDescriptor::new("living-room", "Living Room TV", RouteCapability::all())
}
