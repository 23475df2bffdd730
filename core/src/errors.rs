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

use thiserror::Error;

use crate::transport::CommandKind;

/// Failures of a single command sent to a route.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("No route selected")]
    NoRouteSelected,

    #[error("Command {0:?} not supported by the selected route")]
    CommandNotSupported(CommandKind),

    #[error("Receiver rejected command: {0}")]
    Remote(String),

    #[error("Transport channel closed")]
    Closed,
}

/// Failures reported by route sessions and the coordinator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("No receiver profile handles {0}")]
    NoMatchingReceiver(String),

    #[error("Media is not playable remotely: {0}")]
    MediaNotPlayable(String),

    #[error("Route selection cancelled")]
    SelectionCancelled,

    #[error("Session negotiation failed: {0}")]
    NegotiationFailed(#[source] TransportError),

    #[error("No active session")]
    NoActiveSession,
}

/// Failures of the coordinator handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("Coordinator is not running")]
    Stopped,

    #[error(transparent)]
    Session(#[from] SessionError),
}
