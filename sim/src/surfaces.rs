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

//! Page and UI stand-ins that log what the session manager tells them.

use std::sync::Mutex;

use log::{info, warn};

use rcast_core::collaborators::{MediaInfo, MediaStateListener, TransportControl};
use rcast_core::route_availability::RouteAvailabilityListener;
use rcast_core::PlayerState;

/// A page asking to cast one media element.
pub struct ConsolePage {
    uri: String,
    title: Option<String>,
    start_position_ms: u64,
    last_state: Mutex<PlayerState>,
}

impl ConsolePage {
    pub fn new(uri: impl Into<String>, title: Option<String>, start_position_ms: u64) -> Self {
        Self {
            uri: uri.into(),
            title,
            start_position_ms,
            last_state: Mutex::new(PlayerState::Stopped),
        }
    }

    pub fn last_state(&self) -> PlayerState {
        self.last_state.lock().map(|s| *s).unwrap_or_default()
    }
}

impl MediaStateListener for ConsolePage {
    fn source_uri(&self) -> String {
        self.uri.clone()
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn start_position_ms(&self) -> u64 {
        self.start_position_ms
    }

    fn on_cast_started(&self, route_name: &str) {
        info!("page: casting to {}", route_name);
    }

    fn on_playback_state_changed(&self, state: PlayerState) {
        info!("page: {}", state.as_str());
        if let Ok(mut last) = self.last_state.lock() {
            *last = state;
        }
    }

    fn on_position_changed(&self, position_ms: u64, duration_ms: u64) {
        info!("page: {} / {} ms", position_ms, duration_ms);
    }

    fn on_error(&self, message: &str) {
        warn!("page: {}", message);
    }

    fn on_cast_stopped(&self) {
        info!("page: cast stopped");
    }
}

/// Notification-style transport control.
pub struct ConsoleControl {
    name: &'static str,
}

impl ConsoleControl {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl TransportControl for ConsoleControl {
    fn show(&self, state: PlayerState, media: &MediaInfo) {
        info!(
            "[{}] {} {} on {} at {} ms",
            self.name,
            state.as_str(),
            media.title.as_deref().unwrap_or("untitled"),
            media.route_name.as_deref().unwrap_or("?"),
            media.position_ms
        );
    }

    fn hide(&self) {
        info!("[{}] hidden", self.name);
    }

    fn set_error(&self, message: &str) {
        warn!("[{}] error: {}", self.name, message);
    }
}

/// Cast button that only logs whether it would be visible.
pub struct ConsoleCastButton;

impl RouteAvailabilityListener for ConsoleCastButton {
    fn on_route_availability_changed(&self, available: bool) {
        info!("cast button {}", if available { "visible" } else { "hidden" });
    }
}
