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

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Baseline {
    position_ms: u64,
    duration_ms: u64,
    timestamp_ms: u64,
}

/// Extrapolates the remote playback position between sparse receiver updates.
///
/// While playing, the position advances with wall-clock time from the last baseline and is
/// clamped to the duration. A duration of zero means the receiver has not reported one yet and
/// leaves the extrapolation unbounded. Reads are monotonic while playing: a stale baseline never
/// makes the reported position go backwards; only seeks, pauses and clears reset that floor.
pub struct PositionTracker {
    clock: Arc<dyn Clock>,
    baseline: Option<Baseline>,
    playing: bool,
    seeking: bool,
    floor_ms: u64,
}

impl PositionTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            baseline: None,
            playing: false,
            seeking: false,
            floor_ms: 0,
        }
    }

    pub fn on_position_info_updated(&mut self, duration_ms: u64, position_ms: u64, timestamp_ms: u64) {
        self.baseline = Some(Baseline {
            position_ms: clamp_to_duration(position_ms, duration_ms),
            duration_ms,
            timestamp_ms,
        });
        self.seeking = false;
    }

    /// Switches extrapolation on or off without moving the baseline. Used when the receiver
    /// itself reports the playing state along with a fresh baseline.
    pub fn set_playing(&mut self, playing: bool) {
        if !playing {
            self.floor_ms = 0;
        }
        self.playing = playing;
    }

    pub fn on_paused(&mut self) {
        self.freeze_at(self.position_ms());
        self.playing = false;
        self.floor_ms = 0;
    }

    pub fn on_resumed(&mut self) {
        if !self.playing {
            let position = self.position_ms();
            self.freeze_at(position);
        }
        self.playing = true;
        self.floor_ms = 0;
    }

    pub fn on_finished(&mut self) {
        if let Some(baseline) = self.baseline.as_mut() {
            baseline.position_ms = baseline.duration_ms;
            baseline.timestamp_ms = self.clock.now_ms();
        }
        self.playing = false;
        self.seeking = false;
        self.floor_ms = 0;
    }

    /// Jumps to the seek target immediately; the position stays frozen there until the receiver
    /// confirms with a new baseline.
    pub fn on_seek(&mut self, position_ms: u64) {
        self.freeze_at(position_ms);
        self.seeking = true;
        self.floor_ms = 0;
    }

    pub fn clear(&mut self) {
        self.baseline = None;
        self.playing = false;
        self.seeking = false;
        self.floor_ms = 0;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn duration_ms(&self) -> u64 {
        self.baseline.map(|b| b.duration_ms).unwrap_or_default()
    }

    /// Position for display. Takes `&mut self` because reads while playing advance the floor.
    pub fn get_position(&mut self) -> u64 {
        let position = self.position_ms();
        if self.playing && !self.seeking {
            let clamped = position.max(self.floor_ms);
            self.floor_ms = clamped;
            clamped
        } else {
            position
        }
    }

    fn position_ms(&self) -> u64 {
        let Some(baseline) = self.baseline else { return 0; };
        if !self.playing || self.seeking {
            return baseline.position_ms;
        }
        let elapsed = self.clock.now_ms().saturating_sub(baseline.timestamp_ms);
        clamp_to_duration(baseline.position_ms.saturating_add(elapsed), baseline.duration_ms)
    }

    fn freeze_at(&mut self, position_ms: u64) {
        let now = self.clock.now_ms();
        let duration_ms = self.duration_ms();
        self.baseline = Some(Baseline {
            position_ms: clamp_to_duration(position_ms, duration_ms),
            duration_ms,
            timestamp_ms: now,
        });
    }
}

fn clamp_to_duration(position_ms: u64, duration_ms: u64) -> u64 {
    if duration_ms == 0 {
        position_ms
    } else {
        position_ms.min(duration_ms)
    }
}
