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
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;

use rcast_core::clock::SystemClock;
use rcast_core::collaborators::MemorySettingsStore;
use rcast_core::route_availability::RouteRegistryEvent;
use rcast_core::{
    run_coordinator, Collaborators, CoordinatorConfig, MultiServiceHandle, RemotePlaybackDriver, SessionCoordinator,
    BUILTIN_PROFILES,
};
use rcast_sim::{
    run_receiver, sim_tv, ConsoleCastButton, ConsoleControl, ConsolePage, SimulatedChooser, SimulatedDiscovery,
    SimulatedReceiver,
};

/// Casts one media item to a simulated receiver and walks it through pause, resume, seek and stop.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media to cast
    #[arg(long, default_value = "https://example.com/media/big_buck_bunny.mp4")]
    uri: String,

    #[arg(long)]
    title: Option<String>,

    /// Position to start playback from
    #[arg(long, default_value_t = 0)]
    start_ms: u64,

    /// How long to let the media play before stopping
    #[arg(long, default_value_t = 6_000)]
    play_ms: u64,

    /// Length of every media item on the simulated receiver
    #[arg(long, default_value_t = 60_000)]
    media_ms: u64,

    /// Disable resuming a previous session
    #[arg(long)]
    no_reconnect: bool,

    #[arg(long, default_value_t = 10_000)]
    reconnect_timeout_ms: u64,
}

impl Args {
    fn config(&self) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        config.reconnection.enabled = !self.no_reconnect;
        config.reconnection.timeout = Duration::from_millis(self.reconnect_timeout_ms);
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let clock = Arc::new(SystemClock);
    let receiver = Arc::new(SimulatedReceiver::new(clock.clone(), args.media_ms));
    let discovery = Arc::new(SimulatedDiscovery::new(Vec::new()));
    let collaborators = Collaborators::new(
        receiver.clone(),
        Arc::new(SimulatedChooser::new(vec![sim_tv()])),
        discovery.clone(),
    )
    .with_settings(Arc::new(MemorySettingsStore::new()))
    .with_clock(clock);

    let config = args.config();
    let capacity = config.event_capacity;
    let coordinator = SessionCoordinator::new(collaborators, BUILTIN_PROFILES, config);
    let (driver, coordinator_service) = run_coordinator(coordinator, capacity);
    receiver.attach(driver.clone());

    let mut services = MultiServiceHandle::with_capacity(2);
    services.add(coordinator_service);
    services.add(run_receiver(receiver.clone(), Duration::from_secs(1)));

    let mut events = driver.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("event: {:?}", event);
        }
    });

    driver
        .add_route_availability_listener(args.uri.clone(), Arc::new(ConsoleCastButton))
        .await?;
    discovery.set_routes(vec![sim_tv()]);
    driver.push_route_event(RouteRegistryEvent::RouteAdded(sim_tv()))?;
    driver.add_transport_control(Arc::new(ConsoleControl::new("notification"))).await?;
    driver.add_transport_control(Arc::new(ConsoleControl::new("lock screen"))).await?;

    let page = Arc::new(ConsolePage::new(args.uri.clone(), args.title.clone(), args.start_ms));
    driver
        .request_remote_playback(page.clone())
        .await
        .with_context(|| format!("casting {}", args.uri))?;

    let step = Duration::from_millis(args.play_ms / 3);
    tokio::time::sleep(step).await;
    driver.pause().await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    driver.resume().await?;
    driver.seek(args.start_ms + args.play_ms).await?;
    tokio::time::sleep(step).await;
    if let Some(position) = driver.position().await? {
        info!("at {} of {} ms, page shows {}", position.position_ms, position.duration_ms, page.last_state().as_str());
    }
    tokio::time::sleep(step).await;
    if let Err(e) = driver.stop().await {
        info!("nothing to stop: {}", e);
    }

    services.shutdown().await?;
    Ok(())
}
