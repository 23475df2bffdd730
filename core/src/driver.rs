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
use log::{debug, info};
use tokio::select;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::collaborators::{MediaStateListener, TransportControl};
use crate::coordinator::{AvailabilityRegistration, PlaybackPosition, SessionCoordinator};
use crate::coordinator_events::CoordinatorEvent;
use crate::errors::{CoordinatorError, SessionError};
use crate::observers::ObserverToken;
use crate::route_availability::{RouteAvailabilityListener, RouteRegistryEvent};
use crate::service::{spawn_service, ServiceHandle};
use crate::transport::TransportEvent;

/// Front of the remote playback session manager used by pages and UI surfaces. Backed by the
/// in-process coordinator task; every call is answered by that task in arrival order.
#[async_trait]
pub trait RemotePlaybackDriver: Send + Sync {
    // --- Playback ---
    async fn request_remote_playback(&self, listener: Arc<dyn MediaStateListener>) -> Result<(), CoordinatorError>;
    async fn request_remote_playback_control(&self, listener: Arc<dyn MediaStateListener>) -> Result<bool, CoordinatorError>;

    async fn pause(&self) -> Result<(), CoordinatorError>;
    async fn resume(&self) -> Result<(), CoordinatorError>;
    async fn seek(&self, position_ms: u64) -> Result<(), CoordinatorError>;
    async fn stop(&self) -> Result<(), CoordinatorError>;

    async fn position(&self) -> Result<Option<PlaybackPosition>, CoordinatorError>;

    // --- Observers ---
    async fn add_transport_control(&self, control: Arc<dyn TransportControl>) -> Result<ObserverToken, CoordinatorError>;
    async fn remove_transport_control(&self, token: ObserverToken) -> Result<bool, CoordinatorError>;

    async fn add_route_availability_listener(&self, uri: String, listener: Arc<dyn RouteAvailabilityListener>)
        -> Result<Option<AvailabilityRegistration>, CoordinatorError>;
    async fn remove_route_availability_listener(&self, registration: AvailabilityRegistration) -> Result<bool, CoordinatorError>;

    async fn set_reconnect_enabled(&self, enabled: bool) -> Result<(), CoordinatorError>;

    // Events
    fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent>;
}

enum Command {
    RequestPlayback {
        listener: Arc<dyn MediaStateListener>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    RequestControl {
        listener: Arc<dyn MediaStateListener>,
        reply: oneshot::Sender<bool>,
    },
    Pause { reply: oneshot::Sender<Result<(), SessionError>> },
    Resume { reply: oneshot::Sender<Result<(), SessionError>> },
    Seek { position_ms: u64, reply: oneshot::Sender<Result<(), SessionError>> },
    Stop { reply: oneshot::Sender<Result<(), SessionError>> },
    Position { reply: oneshot::Sender<Option<PlaybackPosition>> },
    AddControl {
        control: Arc<dyn TransportControl>,
        reply: oneshot::Sender<ObserverToken>,
    },
    RemoveControl { token: ObserverToken, reply: oneshot::Sender<bool> },
    AddAvailabilityListener {
        uri: String,
        listener: Arc<dyn RouteAvailabilityListener>,
        reply: oneshot::Sender<Option<AvailabilityRegistration>>,
    },
    RemoveAvailabilityListener {
        registration: AvailabilityRegistration,
        reply: oneshot::Sender<bool>,
    },
    SetReconnectEnabled { enabled: bool, reply: oneshot::Sender<()> },
}

/// Cloneable handle to a running coordinator.
///
/// Requests go through a bounded command channel. Receiver pushes and route registry events go
/// through unbounded channels so platform callbacks never wait.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    transport_events: mpsc::UnboundedSender<TransportEvent>,
    route_events: mpsc::UnboundedSender<RouteRegistryEvent>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    /// Delivers a status push from the receiver.
    pub fn push_transport_event(&self, event: TransportEvent) -> Result<(), CoordinatorError> {
        self.transport_events.send(event).map_err(|_| CoordinatorError::Stopped)
    }

    /// Delivers a route registry change.
    pub fn push_route_event(&self, event: RouteRegistryEvent) -> Result<(), CoordinatorError> {
        self.route_events.send(event).map_err(|_| CoordinatorError::Stopped)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, CoordinatorError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(make(reply)).await.map_err(|_| CoordinatorError::Stopped)?;
        response.await.map_err(|_| CoordinatorError::Stopped)
    }
}

#[async_trait]
impl RemotePlaybackDriver for CoordinatorHandle {
    async fn request_remote_playback(&self, listener: Arc<dyn MediaStateListener>) -> Result<(), CoordinatorError> {
        Ok(self.request(|reply| Command::RequestPlayback { listener, reply }).await??)
    }

    async fn request_remote_playback_control(&self, listener: Arc<dyn MediaStateListener>) -> Result<bool, CoordinatorError> {
        self.request(|reply| Command::RequestControl { listener, reply }).await
    }

    async fn pause(&self) -> Result<(), CoordinatorError> {
        Ok(self.request(|reply| Command::Pause { reply }).await??)
    }

    async fn resume(&self) -> Result<(), CoordinatorError> {
        Ok(self.request(|reply| Command::Resume { reply }).await??)
    }

    async fn seek(&self, position_ms: u64) -> Result<(), CoordinatorError> {
        Ok(self.request(|reply| Command::Seek { position_ms, reply }).await??)
    }

    async fn stop(&self) -> Result<(), CoordinatorError> {
        Ok(self.request(|reply| Command::Stop { reply }).await??)
    }

    async fn position(&self) -> Result<Option<PlaybackPosition>, CoordinatorError> {
        self.request(|reply| Command::Position { reply }).await
    }

    async fn add_transport_control(&self, control: Arc<dyn TransportControl>) -> Result<ObserverToken, CoordinatorError> {
        self.request(|reply| Command::AddControl { control, reply }).await
    }

    async fn remove_transport_control(&self, token: ObserverToken) -> Result<bool, CoordinatorError> {
        self.request(|reply| Command::RemoveControl { token, reply }).await
    }

    async fn add_route_availability_listener(&self, uri: String, listener: Arc<dyn RouteAvailabilityListener>)
        -> Result<Option<AvailabilityRegistration>, CoordinatorError>
    {
        self.request(|reply| Command::AddAvailabilityListener { uri, listener, reply }).await
    }

    async fn remove_route_availability_listener(&self, registration: AvailabilityRegistration) -> Result<bool, CoordinatorError> {
        self.request(|reply| Command::RemoveAvailabilityListener { registration, reply }).await
    }

    async fn set_reconnect_enabled(&self, enabled: bool) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::SetReconnectEnabled { enabled, reply }).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }
}

/// Runs the coordinator as a service task and returns the handle to talk to it.
///
/// The task first tries to resume the persisted session, then handles one input at a time to
/// completion: stop request, reconnection deadline, receiver pushes, route events, commands.
/// It ends when stopped or when every handle is dropped.
pub fn run_coordinator(mut coordinator: SessionCoordinator, command_capacity: usize) -> (CoordinatorHandle, ServiceHandle) {
    let (command_tx, mut command_rx) = mpsc::channel(command_capacity);
    let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();
    let (route_tx, mut route_rx) = mpsc::unbounded_channel();
    let handle = CoordinatorHandle {
        commands: command_tx,
        transport_events: transport_tx,
        route_events: route_tx,
        events: coordinator.event_sender(),
    };

    let service = spawn_service(move |mut stop| async move {
        if coordinator.try_reconnect().await {
            info!("Resuming previous cast session");
        }
        loop {
            let deadline = coordinator.reconnection_deadline();
            select! {
                biased;
                _ = stop.signaled() => {
                    info!("Coordinator shutdown requested");
                    break;
                }
                _ = wait_for_deadline(deadline) => {
                    coordinator.on_reconnection_timeout().await;
                }
                Some(event) = transport_rx.recv() => {
                    coordinator.on_transport_event(event).await;
                }
                Some(event) = route_rx.recv() => {
                    coordinator.on_route_event(event).await;
                }
                command = command_rx.recv() => {
                    match command {
                        Some(command) => apply_command(&mut coordinator, command).await,
                        None => {
                            info!("All coordinator handles dropped; stopping");
                            break;
                        }
                    }
                }
            }
        }
    });
    (handle, service)
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}

async fn apply_command(coordinator: &mut SessionCoordinator, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::RequestPlayback { listener, reply } => {
            let _ = reply.send(coordinator.request_remote_playback(listener).await);
        }
        Command::RequestControl { listener, reply } => {
            let _ = reply.send(coordinator.request_remote_playback_control(&listener));
        }
        Command::Pause { reply } => {
            let _ = reply.send(coordinator.pause().await);
        }
        Command::Resume { reply } => {
            let _ = reply.send(coordinator.resume().await);
        }
        Command::Seek { position_ms, reply } => {
            let _ = reply.send(coordinator.seek(position_ms).await);
        }
        Command::Stop { reply } => {
            let _ = reply.send(coordinator.stop().await);
        }
        Command::Position { reply } => {
            let _ = reply.send(coordinator.position());
        }
        Command::AddControl { control, reply } => {
            let _ = reply.send(coordinator.add_transport_control(control));
        }
        Command::RemoveControl { token, reply } => {
            let _ = reply.send(coordinator.remove_transport_control(token));
        }
        Command::AddAvailabilityListener { uri, listener, reply } => {
            let _ = reply.send(coordinator.add_route_availability_listener(&uri, listener));
        }
        Command::RemoveAvailabilityListener { registration, reply } => {
            let _ = reply.send(coordinator.remove_route_availability_listener(registration));
        }
        Command::SetReconnectEnabled { enabled, reply } => {
            debug!("Reconnection enabled: {}", enabled);
            coordinator.set_reconnect_enabled(enabled);
            let _ = reply.send(());
        }
    }
}
