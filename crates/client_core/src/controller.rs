use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::SyncError,
    gateway::FetchGateway,
    scheduler::{PollHandle, PollScheduler, TokioPollScheduler},
    sync_state::{FetchTicket, ListSnapshot, MergeOutcome, SyncOptions, SyncState},
};
use shared::domain::RankedEntry;

/// Drives a [`SyncState`] against a [`FetchGateway`].
///
/// Operations decide synchronously under the state lock, emit a snapshot if
/// anything changed, and hand the network call to a spawned task. The task
/// re-enters the lock to merge, so merges never interleave.
pub struct ListSyncController {
    gateway: Arc<dyn FetchGateway>,
    scheduler: Arc<dyn PollScheduler>,
    options: SyncOptions,
    state: Mutex<SyncState>,
    poll_timer: Mutex<Option<PollHandle>>,
    snapshots: broadcast::Sender<ListSnapshot>,
}

impl ListSyncController {
    pub fn new(gateway: Arc<dyn FetchGateway>, options: SyncOptions) -> Arc<Self> {
        Self::new_with_scheduler(gateway, Arc::new(TokioPollScheduler), options)
    }

    pub fn new_with_scheduler(
        gateway: Arc<dyn FetchGateway>,
        scheduler: Arc<dyn PollScheduler>,
        options: SyncOptions,
    ) -> Arc<Self> {
        let (snapshots, _) = broadcast::channel(256);
        Arc::new(Self {
            gateway,
            scheduler,
            state: Mutex::new(SyncState::new(&options)),
            options,
            poll_timer: Mutex::new(None),
            snapshots,
        })
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> ListSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn start(self: &Arc<Self>) -> bool {
        self.run("start", false, |state| state.start()).await
    }

    pub async fn refresh(self: &Arc<Self>) -> bool {
        self.run("refresh", false, |state| state.refresh()).await
    }

    pub async fn load_more(self: &Arc<Self>) -> bool {
        self.run("load_more", false, |state| state.load_more()).await
    }

    pub async fn poll(self: &Arc<Self>) -> bool {
        self.run("poll", false, |state| state.poll()).await
    }

    /// Returns whether a request was issued; the list is reset either way.
    pub async fn set_query(self: &Arc<Self>, query: &str) -> bool {
        self.run("set_query", true, |state| state.set_query(query))
            .await
    }

    /// Starts the poll timer if it is not already running.
    pub async fn focus_gained(self: &Arc<Self>) {
        // Lock order is timer then state, so a concurrent dispose either sees
        // this timer or is seen here.
        let mut timer = self.poll_timer.lock().await;
        if self.state.lock().await.is_disposed() {
            return;
        }
        if timer.as_ref().is_some_and(PollHandle::is_active) {
            return;
        }
        let controller = Arc::downgrade(self);
        let handle = self.scheduler.schedule_every(
            self.options.poll_interval,
            Box::new(move || {
                let controller = controller.clone();
                async move {
                    if let Some(controller) = controller.upgrade() {
                        controller.poll().await;
                    }
                }
                .boxed()
            }),
        );
        *timer = Some(handle);
        info!(
            interval_ms = self.options.poll_interval.as_millis() as u64,
            "poll timer started"
        );
    }

    pub async fn focus_lost(&self) {
        if let Some(mut handle) = self.poll_timer.lock().await.take() {
            handle.cancel();
            info!("poll timer cancelled");
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.poll_timer
            .lock()
            .await
            .as_ref()
            .is_some_and(PollHandle::is_active)
    }

    /// Stops the poll timer and retires every outstanding request.
    pub async fn dispose(&self) {
        {
            let mut state = self.state.lock().await;
            if !state.is_disposed() {
                state.dispose();
                debug!(generation = state.generation(), "controller disposed");
            }
        }
        self.focus_lost().await;
    }

    async fn run<F>(self: &Arc<Self>, op: &'static str, always_emit: bool, transition: F) -> bool
    where
        F: FnOnce(&mut SyncState) -> Option<FetchTicket>,
    {
        let ticket = {
            let mut state = self.state.lock().await;
            let ticket = transition(&mut state);
            if ticket.is_some() || always_emit {
                let _ = self.snapshots.send(state.snapshot());
            }
            ticket
        };

        let Some(ticket) = ticket else {
            debug!(op, "operation ignored");
            return false;
        };
        debug!(
            op,
            generation = ticket.generation,
            offset = ticket.request.offset,
            limit = ticket.request.limit,
            "issuing page request"
        );
        self.spawn_fetch(ticket);
        true
    }

    fn spawn_fetch(self: &Arc<Self>, ticket: FetchTicket) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let result = controller.gateway.fetch_page(&ticket.request).await;
            controller.complete(ticket, result).await;
        });
    }

    async fn complete(&self, ticket: FetchTicket, result: Result<Vec<RankedEntry>, SyncError>) {
        let mut state = self.state.lock().await;
        match state.apply(&ticket, result) {
            MergeOutcome::Merged => {
                debug!(
                    kind = ?ticket.kind,
                    generation = ticket.generation,
                    items = state.items().len(),
                    "merged page"
                );
                let _ = self.snapshots.send(state.snapshot());
            }
            MergeOutcome::Failed => {
                warn!(
                    kind = ?ticket.kind,
                    generation = ticket.generation,
                    error = state.error().unwrap_or_default(),
                    "page request failed"
                );
                let _ = self.snapshots.send(state.snapshot());
            }
            MergeOutcome::Discarded => {
                debug!(
                    kind = ?ticket.kind,
                    ticket_generation = ticket.generation,
                    current_generation = state.generation(),
                    "discarded stale response"
                );
            }
        }
    }
}
