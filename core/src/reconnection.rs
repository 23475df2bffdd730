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

use log::debug;
use tokio::time::Instant;

use crate::config::ReconnectionConfig;
use crate::collaborators::SettingsStore;
use crate::definitions::PlayerState;
use crate::transport::DEFAULT_ROUTE_ID;

pub const KEY_SESSION_ID: &str = "remote_playback.session_id";
pub const KEY_ROUTE_ID: &str = "remote_playback.route_id";
pub const KEY_PROFILE: &str = "remote_playback.profile";
pub const KEY_LAST_URI: &str = "remote_playback.last_uri";
pub const KEY_LAST_STATE: &str = "remote_playback.last_state";
pub const KEY_POSITION_MS: &str = "remote_playback.position_ms";
pub const KEY_DURATION_MS: &str = "remote_playback.duration_ms";
pub const KEY_UPDATED_AT_MS: &str = "remote_playback.updated_at_ms";
pub const KEY_RECONNECT_ENABLED: &str = "remote_playback.reconnect_enabled";

/// What survived from the previous process about the last cast.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSession {
    pub session_id: String,
    pub route_id: Option<String>,
    pub profile: Option<String>,
    pub uri: Option<String>,
    pub state: PlayerState,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub updated_at_ms: u64,
    pub reconnect_enabled: bool,
}

/// Typed access to the persisted session keys. Writes are best-effort and last-write-wins.
#[derive(Clone)]
pub struct SessionRecord {
    store: Arc<dyn SettingsStore>,
}

impl SessionRecord {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn save_session(&self, profile: &str, session_id: &str, route_id: &str) {
        self.store.set_string(KEY_PROFILE, profile);
        self.store.set_string(KEY_SESSION_ID, session_id);
        self.store.set_string(KEY_ROUTE_ID, route_id);
    }

    pub fn save_uri(&self, uri: &str) {
        self.store.set_string(KEY_LAST_URI, uri);
    }

    pub fn save_progress(&self, state: PlayerState, position_ms: u64, duration_ms: u64, now_ms: u64) {
        self.store.set_string(KEY_LAST_STATE, state.as_str());
        self.store.set_string(KEY_POSITION_MS, &position_ms.to_string());
        self.store.set_string(KEY_DURATION_MS, &duration_ms.to_string());
        self.store.set_string(KEY_UPDATED_AT_MS, &now_ms.to_string());
    }

    /// Forgets the session. The reconnection flag is a user preference and stays.
    pub fn clear(&self) {
        for key in [KEY_SESSION_ID, KEY_ROUTE_ID, KEY_PROFILE, KEY_LAST_URI, KEY_LAST_STATE,
            KEY_POSITION_MS, KEY_DURATION_MS, KEY_UPDATED_AT_MS] {
            self.store.remove(key);
        }
    }

    pub fn set_reconnect_enabled(&self, enabled: bool) {
        self.store.set_bool(KEY_RECONNECT_ENABLED, enabled);
    }

    pub fn load(&self) -> Option<PersistedSession> {
        let session_id = self.store.get_string(KEY_SESSION_ID)?;
        let number = |key| {
            self.store
                .get_string(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or_default()
        };
        Some(PersistedSession {
            session_id,
            route_id: self.store.get_string(KEY_ROUTE_ID),
            profile: self.store.get_string(KEY_PROFILE),
            uri: self.store.get_string(KEY_LAST_URI),
            state: self
                .store
                .get_string(KEY_LAST_STATE)
                .and_then(|s| PlayerState::parse(&s))
                .unwrap_or_default(),
            position_ms: number(KEY_POSITION_MS),
            duration_ms: number(KEY_DURATION_MS),
            updated_at_ms: number(KEY_UPDATED_AT_MS),
            reconnect_enabled: self.store.get_bool(KEY_RECONNECT_ENABLED).unwrap_or(true),
        })
    }
}

/// A reconnection in flight, waiting for the receiver to confirm `session_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReconnection {
    pub session_index: usize,
    pub session_id: String,
    pub deadline: Instant,
}

impl PendingReconnection {
    pub fn is_confirmed_by(&self, session_index: usize, session_id: &str) -> bool {
        self.session_index == session_index && self.session_id == session_id
    }
}

/// Decides whether a persisted session is worth resuming.
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    config: ReconnectionConfig,
}

impl ReconnectionPolicy {
    pub fn new(config: ReconnectionConfig) -> Self {
        Self { config }
    }

    pub fn should_reconnect(&self, persisted: Option<&PersistedSession>, now_ms: u64) -> bool {
        let Some(persisted) = persisted else {
            return false;
        };
        if !self.config.enabled || !persisted.reconnect_enabled {
            debug!("Reconnection disabled");
            return false;
        }
        match persisted.route_id.as_deref() {
            None | Some(DEFAULT_ROUTE_ID) => return false,
            Some(_) => {}
        }
        match persisted.state {
            PlayerState::Playing | PlayerState::Loading => {
                let remaining_ms = persisted.duration_ms.saturating_sub(persisted.position_ms);
                now_ms < persisted.updated_at_ms.saturating_add(remaining_ms)
            }
            PlayerState::Paused => true,
            _ => false,
        }
    }

    /// Starts the bounded wait for the receiver to confirm the session.
    pub fn begin(&self, session_index: usize, session_id: String) -> PendingReconnection {
        PendingReconnection {
            session_index,
            session_id,
            deadline: Instant::now() + self.config.timeout,
        }
    }
}
