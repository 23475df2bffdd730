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

use std::time::Duration;

use crate::definitions::NEAR_END_THRESHOLD_MS;

/// Reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionConfig {
    /// Master switch; the persisted per-user flag must also allow it.
    pub enabled: bool,
    /// How long a reconnection attempt may wait for the receiver to confirm the session.
    pub timeout: Duration,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Capacity of the coordinator event broadcast and request channels.
    pub event_capacity: usize,
    pub reconnection: ReconnectionConfig,
    /// A paused item closer than this to its end counts as finished.
    pub near_end_threshold_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            reconnection: ReconnectionConfig::default(),
            near_end_threshold_ms: NEAR_END_THRESHOLD_MS,
        }
    }
}
