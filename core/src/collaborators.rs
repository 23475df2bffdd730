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

//! Contracts of the collaborators the session manager drives but does not implement: the page
//! that asked for the cast, the transport-control surfaces, the route chooser, persisted
//! settings, URL resolution and metrics.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;

use crate::definitions::{PlayerState, RouteCapability};
use crate::transport::RouteDescriptor;

/// The page-side media element that requested remote playback.
///
/// Route sessions only keep a weak reference to it; the cast survives the page going away.
pub trait MediaStateListener: Send + Sync {
    fn source_uri(&self) -> String;

    fn title(&self) -> Option<String> {
        None
    }

    fn start_position_ms(&self) -> u64 {
        0
    }

    fn cookies(&self) -> Option<String> {
        None
    }

    fn user_agent(&self) -> Option<String> {
        None
    }

    fn on_cast_started(&self, _route_name: &str) {}

    fn on_playback_state_changed(&self, _state: PlayerState) {}

    fn on_position_changed(&self, _position_ms: u64, _duration_ms: u64) {}

    fn on_error(&self, _message: &str) {}

    fn on_cast_stopped(&self) {}
}

/// What the transport controls render next to the state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub route_name: Option<String>,
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// Notification / lock-screen transport controls.
pub trait TransportControl: Send + Sync {
    fn show(&self, state: PlayerState, media: &MediaInfo);
    fn hide(&self);
    fn set_error(&self, message: &str);
}

/// Platform route chooser.
#[async_trait]
pub trait RouteChooser: Send + Sync {
    /// Asks the user for a device; `None` when the dialog was cancelled.
    async fn prompt_device_selection(&self, selector: RouteCapability) -> Option<RouteDescriptor>;

    /// Selects a known route without user interaction; `None` when the route is not around.
    async fn select_route(&self, route_id: &str) -> Option<RouteDescriptor>;
}

/// Best-effort key-value store for state that must outlive the process.
pub trait SettingsStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str);
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_bool(&self, key: &str, value: bool);
    fn remove(&self, key: &str);
}

#[derive(Debug, Clone, PartialEq)]
enum StoredValue {
    Text(String),
    Flag(bool),
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, StoredValue>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let values = self.values.lock().ok()?;
        match values.get(key) {
            Some(StoredValue::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), StoredValue::Text(value.to_string()));
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        let values = self.values.lock().ok()?;
        match values.get(key) {
            Some(StoredValue::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    fn set_bool(&self, key: &str, value: bool) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), StoredValue::Flag(value));
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    pub playable: bool,
    pub uri: String,
}

#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, uri: &str, cookies: Option<&str>, user_agent: Option<&str>) -> ResolvedUrl;
}

/// Accepts http(s) URIs as they are; receivers cannot fetch anything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughUrlResolver;

#[async_trait]
impl UrlResolver for PassthroughUrlResolver {
    async fn resolve(&self, uri: &str, _cookies: Option<&str>, _user_agent: Option<&str>) -> ResolvedUrl {
        let playable = uri.starts_with("http://") || uri.starts_with("https://");
        ResolvedUrl { playable, uri: uri.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricEvent {
    CastStarted { profile: &'static str },
    CastEnded { profile: &'static str, remaining_ms: u64 },
    RouteLost { profile: &'static str, remaining_ms: u64 },
    NegotiationFailed { profile: &'static str },
    PlaybackError { profile: &'static str },
    ReconnectionAttempted { profile: &'static str },
    ReconnectionSucceeded { profile: &'static str },
    ReconnectionTimedOut { profile: &'static str },
}

/// Fire-and-forget metrics recording.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn record(&self, event: MetricEvent) {
        debug!("metric: {:?}", event);
    }
}
