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

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod coordinator_events;
pub mod definitions;
pub mod driver;
pub mod errors;
pub mod observers;
pub mod position_tracker;
pub mod reconnection;
pub mod receiver_profile;
pub mod route_availability;
pub mod route_session;
pub mod service;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{CoordinatorConfig, ReconnectionConfig};
pub use coordinator::{AvailabilityRegistration, Collaborators, PlaybackPosition, SessionCoordinator};
pub use coordinator_events::CoordinatorEvent;
pub use definitions::{PlayerState, RouteCapability};
pub use driver::{run_coordinator, CoordinatorHandle, RemotePlaybackDriver};
pub use errors::{CoordinatorError, SessionError, TransportError};
pub use receiver_profile::{ReceiverProfile, BUILTIN_PROFILES};
pub use service::{spawn_service, MultiServiceHandle, ServiceHandle, StopHandle};
