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

use crate::definitions::RouteCapability;
use crate::observers::{ObserverRegistry, ObserverToken};
use crate::transport::RouteDescriptor;

/// Events from the platform route registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteRegistryEvent {
    ProviderAdded,
    ProviderChanged,
    ProviderRemoved,
    RouteAdded(RouteDescriptor),
    RouteChanged(RouteDescriptor),
    RouteRemoved { route_id: String },
    /// The platform dropped the selection, e.g. another app claimed the device.
    RouteUnselected { route_id: String },
}

impl RouteRegistryEvent {
    pub fn affects_availability(&self) -> bool {
        !matches!(self, Self::RouteUnselected { .. })
    }

    /// Route whose loss ends any session running on it.
    pub fn lost_route_id(&self) -> Option<&str> {
        match self {
            Self::RouteRemoved { route_id } | Self::RouteUnselected { route_id } => Some(route_id),
            _ => None,
        }
    }
}

/// Platform route discovery.
pub trait RouteDiscovery: Send + Sync {
    fn start_discovery(&self, selector: RouteCapability);
    fn stop_discovery(&self, selector: RouteCapability);
    /// Current snapshot of the route registry.
    fn routes(&self) -> Vec<RouteDescriptor>;
}

pub trait RouteAvailabilityListener: Send + Sync {
    fn on_route_availability_changed(&self, available: bool);
}

/// Tracks whether any route matching a selector is available.
///
/// Discovery runs only while at least one listener is registered.
pub struct RouteAvailabilityTracker {
    selector: RouteCapability,
    discovery: Arc<dyn RouteDiscovery>,
    listeners: ObserverRegistry<dyn RouteAvailabilityListener>,
    available: bool,
}

impl RouteAvailabilityTracker {
    pub fn new(selector: RouteCapability, discovery: Arc<dyn RouteDiscovery>) -> Self {
        Self {
            selector,
            discovery,
            listeners: ObserverRegistry::new(),
            available: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Registers a listener and tells it the current availability right away.
    pub fn add_listener(&mut self, listener: Arc<dyn RouteAvailabilityListener>) -> ObserverToken {
        if self.listeners.is_empty() {
            debug!("Starting route discovery for {:?}", self.selector);
            self.discovery.start_discovery(self.selector);
            self.available = self.compute();
        }
        listener.on_route_availability_changed(self.available);
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, token: ObserverToken) -> bool {
        if self.listeners.remove(token).is_none() {
            return false;
        }
        if self.listeners.is_empty() {
            debug!("Stopping route discovery for {:?}", self.selector);
            self.discovery.stop_discovery(self.selector);
        }
        true
    }

    /// Recomputes availability. Returns the new value only when it changed.
    pub fn on_registry_event(&mut self, event: &RouteRegistryEvent) -> Option<bool> {
        if !event.affects_availability() {
            return None;
        }
        let available = self.compute();
        if available == self.available {
            return None;
        }
        self.available = available;
        for listener in self.listeners.snapshot() {
            listener.on_route_availability_changed(available);
        }
        Some(available)
    }

    fn compute(&self) -> bool {
        self.discovery.routes().iter().any(|route| route.matches(self.selector))
    }
}
