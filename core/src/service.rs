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

//! Spawned background tasks with cooperative shutdown.

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

/// Lets a background task observe a stop request. Use [`StopHandle::signaled`] as a `select!`
/// branch next to the task's own inputs.
pub struct StopHandle {
    shutdown_rx: oneshot::Receiver<()>,
}

impl StopHandle {
    fn new(shutdown_rx: oneshot::Receiver<()>) -> Self {
        Self { shutdown_rx }
    }

    /// Resolves once a stop was requested or the owning [`ServiceHandle`] was dropped.
    ///
    /// ```rust
    /// use rcast_core::spawn_service;
    ///
    /// async fn run() {
    ///     let service = spawn_service(move |mut stop| async move {
    ///         stop.signaled().await;
    ///     });
    ///     service.shutdown().await.unwrap();
    /// }
    /// ```
    pub async fn signaled(&mut self) {
        (&mut self.shutdown_rx).await.unwrap_or_default();
    }
}

/// Owner side of a task started with [`spawn_service`].
pub struct ServiceHandle {
    join: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ServiceHandle {
    pub fn new(join: JoinHandle<()>, shutdown_tx: oneshot::Sender<()>) -> Self {
        Self { join, shutdown_tx: Some(shutdown_tx) }
    }

    /// Signals the task without waiting for it.
    pub fn request_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub async fn await_join(self) -> Result<(), JoinError> {
        self.join.await
    }

    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        self.request_shutdown();
        self.await_join().await
    }
}

/// Spawns `f` on the Tokio runtime, handing it the [`StopHandle`] it must watch.
pub fn spawn_service<Fut, Func>(f: Func) -> ServiceHandle
where
    Fut: Future<Output = ()> + Send + 'static,
    Func: FnOnce(StopHandle) -> Fut + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let stop = StopHandle::new(shutdown_rx);
    let join = tokio::spawn(async move {
        f(stop).await;
    });
    ServiceHandle::new(join, shutdown_tx)
}

/// Several services stopped together, e.g. the coordinator and a simulated receiver.
pub struct MultiServiceHandle {
    handles: Vec<ServiceHandle>,
}

impl MultiServiceHandle {
    pub fn with_capacity(cap: usize) -> Self {
        Self { handles: Vec::with_capacity(cap) }
    }

    pub fn add(&mut self, handle: ServiceHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every service first, then waits for all of them. Reports the first join error.
    pub async fn shutdown(mut self) -> Result<(), JoinError> {
        for handle in &mut self.handles {
            handle.request_shutdown();
        }
        let mut first_err = None;
        for handle in self.handles {
            if let Err(e) = handle.await_join().await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stops_every_service() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut services = MultiServiceHandle::with_capacity(2);
        for _ in 0..2 {
            let stopped = stopped.clone();
            services.add(spawn_service(move |mut stop| async move {
                stop.signaled().await;
                stopped.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(services.len(), 2);

        services.shutdown().await.unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_handle_releases_the_task() {
        let (done_tx, done_rx) = oneshot::channel();
        let service = spawn_service(move |mut stop| async move {
            stop.signaled().await;
            let _ = done_tx.send(());
        });
        let ServiceHandle { join, shutdown_tx } = service;
        drop(shutdown_tx);

        done_rx.await.unwrap();
        join.await.unwrap();
    }
}
