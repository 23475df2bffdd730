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

use crate::definitions::PlayerState;
use crate::route_session::ReleaseReason;

/// Events broadcast by the session coordinator about sessions and route availability.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// A receiver session was started on a route.
    SessionStarted { profile: &'static str, session_id: String },

    /// The displayed playback state of a session changed.
    StateChanged { profile: &'static str, state: PlayerState },

    /// Playback or negotiation failed. The message is meant for the user.
    PlaybackError { profile: &'static str, message: String },

    /// A session was torn down.
    SessionReleased { profile: &'static str, reason: ReleaseReason },

    /// The session owning the transport controls changed. None when no session is current.
    CurrentChanged { profile: Option<&'static str> },

    /// Whether any route matching a profile is available changed.
    RouteAvailabilityChanged { profile: &'static str, available: bool },

    /// A persisted session is being resumed.
    ReconnectionStarted { profile: &'static str, session_id: String },

    /// The receiver confirmed a resumed session.
    ReconnectionSucceeded { profile: &'static str, session_id: String },
}
