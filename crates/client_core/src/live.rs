use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::{
    gateway::FetchGateway,
    scheduler::{PollHandle, PollScheduler},
};

/// Tracks whether the server-side rating simulation is running, which views
/// show as a "live" badge.
pub struct LiveStatusMonitor {
    gateway: Arc<dyn FetchGateway>,
    scheduler: Arc<dyn PollScheduler>,
    interval: Duration,
    running: Mutex<Option<bool>>,
    timer: Mutex<Option<PollHandle>>,
    updates: broadcast::Sender<bool>,
}

impl LiveStatusMonitor {
    pub fn new(
        gateway: Arc<dyn FetchGateway>,
        scheduler: Arc<dyn PollScheduler>,
        interval: Duration,
    ) -> Arc<Self> {
        let (updates, _) = broadcast::channel(16);
        Arc::new(Self {
            gateway,
            scheduler,
            interval,
            running: Mutex::new(None),
            timer: Mutex::new(None),
            updates,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.updates.subscribe()
    }

    pub async fn is_running(&self) -> Option<bool> {
        *self.running.lock().await
    }

    /// Fetches the status once. A failure keeps the last known value.
    pub async fn check(&self) -> Option<bool> {
        match self.gateway.simulation_status().await {
            Ok(status) => {
                let running = status.is_running();
                let mut guard = self.running.lock().await;
                if *guard != Some(running) {
                    *guard = Some(running);
                    debug!(running, "simulation status changed");
                    let _ = self.updates.send(running);
                }
                Some(running)
            }
            Err(err) => {
                warn!("failed to fetch simulation status: {err}");
                *self.running.lock().await
            }
        }
    }

    pub async fn focus_gained(self: &Arc<Self>) {
        let mut timer = self.timer.lock().await;
        if timer.as_ref().is_some_and(PollHandle::is_active) {
            return;
        }
        let monitor = Arc::downgrade(self);
        *timer = Some(self.scheduler.schedule_every(
            self.interval,
            Box::new(move || {
                let monitor = monitor.clone();
                async move {
                    if let Some(monitor) = monitor.upgrade() {
                        monitor.check().await;
                    }
                }
                .boxed()
            }),
        ));
    }

    pub async fn focus_lost(&self) {
        if let Some(mut handle) = self.timer.lock().await.take() {
            handle.cancel();
        }
    }
}
