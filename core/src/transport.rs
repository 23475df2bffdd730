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

use async_trait::async_trait;

use crate::definitions::{RemotePlaybackState, RemoteSessionState, RouteCapability};
use crate::errors::TransportError;

/// A discoverable remote playback endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub id: String,
    pub name: String,
    pub capabilities: RouteCapability,
    /// The local "no device" route.
    pub is_default: bool,
}

impl RouteDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, capabilities: RouteCapability) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities,
            is_default: false,
        }
    }

    pub fn default_route() -> Self {
        Self {
            id: DEFAULT_ROUTE_ID.to_string(),
            name: "This device".to_string(),
            capabilities: RouteCapability::empty(),
            is_default: true,
        }
    }

    pub fn supports(&self, capability: RouteCapability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Whether the route can serve a receiver asking for `selector`.
    pub fn matches(&self, selector: RouteCapability) -> bool {
        !self.is_default && self.supports(selector)
    }
}

pub const DEFAULT_ROUTE_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    StartSession,
    EndSession,
    GetSessionStatus,
    Play,
    Pause,
    Resume,
    Seek,
    Stop,
    GetStatus,
}

impl CommandKind {
    pub fn required_capability(self) -> RouteCapability {
        match self {
            Self::StartSession | Self::EndSession => RouteCapability::SessionControl,
            Self::GetSessionStatus | Self::GetStatus => RouteCapability::StatusQuery,
            Self::Play | Self::Pause | Self::Resume | Self::Seek | Self::Stop => RouteCapability::RemotePlayback,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteCommand {
    StartSession { application_id: String },
    EndSession,
    GetSessionStatus,
    Play {
        uri: String,
        title: Option<String>,
        mime_type: String,
        start_position_ms: u64,
    },
    Pause,
    Resume,
    Seek { position_ms: u64 },
    Stop,
    GetStatus,
}

impl RouteCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::StartSession { .. } => CommandKind::StartSession,
            Self::EndSession => CommandKind::EndSession,
            Self::GetSessionStatus => CommandKind::GetSessionStatus,
            Self::Play { .. } => CommandKind::Play,
            Self::Pause => CommandKind::Pause,
            Self::Resume => CommandKind::Resume,
            Self::Seek { .. } => CommandKind::Seek,
            Self::Stop => CommandKind::Stop,
            Self::GetStatus => CommandKind::GetStatus,
        }
    }
}

/// One command addressed to a route, with the session and item it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub route_id: String,
    pub session_id: Option<String>,
    pub item_id: Option<String>,
    pub command: RouteCommand,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResult {
    pub session_id: Option<String>,
    pub item_id: Option<String>,
    pub item_status: Option<ItemStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub session_id: String,
    pub state: RemoteSessionState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemStatus {
    pub item_id: String,
    pub state: RemotePlaybackState,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub timestamp_ms: u64,
}

/// Status pushed asynchronously by the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    SessionStatus(SessionStatus),
    ItemStatus(ItemStatus),
}

/// Opaque channel to the platform route layer.
///
/// Status pushes do not go through this trait; the platform layer delivers them to the
/// coordinator as [`TransportEvent`]s.
#[async_trait]
pub trait RouteTransport: Send + Sync {
    async fn send_command(&self, request: CommandRequest) -> Result<CommandResult, TransportError>;

    fn supports_command(&self, _kind: CommandKind) -> bool {
        true
    }
}

/// Per-session front of a [`RouteTransport`] bound to the currently selected route.
pub struct SessionTransport {
    transport: Arc<dyn RouteTransport>,
    route: Option<RouteDescriptor>,
}

impl SessionTransport {
    pub fn new(transport: Arc<dyn RouteTransport>) -> Self {
        Self { transport, route: None }
    }

    pub fn select_route(&mut self, route: RouteDescriptor) {
        self.route = Some(route);
    }

    pub fn clear_route(&mut self) -> Option<RouteDescriptor> {
        self.route.take()
    }

    pub fn route(&self) -> Option<&RouteDescriptor> {
        self.route.as_ref()
    }

    pub fn can_send(&self, kind: CommandKind) -> bool {
        self.route
            .as_ref()
            .is_some_and(|r| r.supports(kind.required_capability()))
            && self.transport.supports_command(kind)
    }

    /// Sends `command` to the selected route. Fails without a round-trip when there is no route
    /// or the route does not declare the command's category.
    pub async fn send(&self, command: RouteCommand, session_id: Option<&str>, item_id: Option<&str>)
        -> Result<CommandResult, TransportError>
    {
        let route = self.route.as_ref().ok_or(TransportError::NoRouteSelected)?;
        let kind = command.kind();
        if !self.can_send(kind) {
            return Err(TransportError::CommandNotSupported(kind));
        }
        self.transport
            .send_command(CommandRequest {
                route_id: route.id.clone(),
                session_id: session_id.map(str::to_string),
                item_id: item_id.map(str::to_string),
                command,
            })
            .await
    }
}
