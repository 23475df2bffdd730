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

use bitflags::bitflags;

bitflags! {
    /// Command categories a route can declare support for.
    #[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
    pub struct RouteCapability: u8 {
        const RemotePlayback = 0x01;
        const SessionControl = 0x02;
        const StatusQuery = 0x04;
    }
}

/// Playback state of the item loaded on a route session.
///
/// The values are not ordered; the only meaningful relation between them is given by the
/// transitions a route session performs.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerState {
    #[default]
    Stopped = 0x00,
    Loading = 0x01,
    Playing = 0x02,
    Paused = 0x03,
    Error = 0x04,
    Invalidated = 0x05,
    Finished = 0x06,
}

impl PlayerState {
    /// States in which an item is loaded on the receiver.
    pub fn is_item_active(self) -> bool {
        matches!(self, Self::Loading | Self::Playing | Self::Paused)
    }

    /// States that end the current item and the cast along with it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Invalidated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Invalidated => "invalidated",
            Self::Finished => "finished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stopped" => Some(Self::Stopped),
            "loading" => Some(Self::Loading),
            "playing" => Some(Self::Playing),
            "paused" => Some(Self::Paused),
            "error" => Some(Self::Error),
            "invalidated" => Some(Self::Invalidated),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Item playback state as reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePlaybackState {
    Pending,
    Buffering,
    Playing,
    Paused,
    Finished,
    Canceled,
    Invalidated,
    Error,
}

/// Session state as reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSessionState {
    Active,
    Ended,
    Invalidated,
}

/// Lifecycle of the receiver session owned by a route session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionLifecycle {
    #[default]
    Idle,
    Starting,
    Active,
    Ending,
}

/// A paused item this close to its end is reported as finished.
pub const NEAR_END_THRESHOLD_MS: u64 = 500;
