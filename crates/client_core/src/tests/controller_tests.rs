use super::*;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{domain::RankedEntry, protocol::SimulationStatus};
use tokio::sync::{broadcast, mpsc, oneshot};

type PageResult = Result<Vec<RankedEntry>, SyncError>;

fn entries(first_rank: i64, count: usize) -> Vec<RankedEntry> {
    (0..count as i64)
        .map(|i| {
            let rank = first_rank + i;
            RankedEntry::new(rank, format!("user{rank}"), (10_000 - rank) as f64, rank)
        })
        .collect()
}

/// Answers immediately from a backing set of `total` ranked users.
struct BackedGateway {
    total: usize,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl BackedGateway {
    fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            total,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchGateway for BackedGateway {
    async fn fetch_page(&self, request: &PageRequest) -> PageResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::TransientNetworkFailure(
                "connection refused".to_string(),
            ));
        }
        let end = (request.offset + request.limit).min(self.total);
        if request.offset >= end {
            return Ok(Vec::new());
        }
        Ok(entries(request.offset as i64 + 1, end - request.offset))
    }

    async fn lookup_rank(&self, _username: &str) -> PageResult {
        Err(SyncError::NotFound)
    }

    async fn simulation_status(&self) -> Result<SimulationStatus, SyncError> {
        Ok(SimulationStatus {
            status: "running".to_string(),
        })
    }
}

struct HeldRequest {
    request: PageRequest,
    respond: oneshot::Sender<PageResult>,
}

/// Parks every request until the test answers it, so responses can be
/// delivered in any order.
struct HeldGateway {
    requests: mpsc::UnboundedSender<HeldRequest>,
}

impl HeldGateway {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<HeldRequest>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { requests }), rx)
    }
}

#[async_trait]
impl FetchGateway for HeldGateway {
    async fn fetch_page(&self, request: &PageRequest) -> PageResult {
        let (respond, rx) = oneshot::channel();
        self.requests
            .send(HeldRequest {
                request: request.clone(),
                respond,
            })
            .map_err(|_| SyncError::TransientNetworkFailure("test closed".to_string()))?;
        rx.await
            .unwrap_or_else(|_| Err(SyncError::TransientNetworkFailure("dropped".to_string())))
    }

    async fn lookup_rank(&self, _username: &str) -> PageResult {
        Err(SyncError::NotFound)
    }

    async fn simulation_status(&self) -> Result<SimulationStatus, SyncError> {
        Err(SyncError::TransientNetworkFailure("unused".to_string()))
    }
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<ListSnapshot>, predicate: F) -> ListSnapshot
where
    F: Fn(&ListSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(snapshot) if predicate(&snapshot) => return snapshot,
                Ok(_) => continue,
                Err(err) => panic!("snapshot stream ended: {err}"),
            }
        }
    })
    .await
    .expect("expected snapshot was not emitted")
}

async fn next_request(rx: &mut mpsc::UnboundedReceiver<HeldRequest>) -> HeldRequest {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("request was not issued")
        .expect("gateway alive")
}

async fn let_tasks_run() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn three_load_more_calls_drain_backing_set() {
    let gateway = BackedGateway::new(120);
    let controller = ListSyncController::new(gateway.clone(), SyncOptions::leaderboard());
    let mut rx = controller.subscribe();

    for expected in [50, 100, 120] {
        assert!(controller.load_more().await);
        wait_for(&mut rx, |s| s.status == SyncStatus::Ready && s.items.len() == expected).await;
    }

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.items.len(), 120);
    assert!(!snapshot.has_more);
    assert!(!controller.load_more().await);
    assert_eq!(gateway.calls(), 3);
}

#[tokio::test]
async fn rapid_load_more_issues_a_single_request() {
    let (gateway, mut requests) = HeldGateway::new();
    let controller = ListSyncController::new(gateway, SyncOptions::leaderboard());
    let mut rx = controller.subscribe();

    assert!(controller.load_more().await);
    assert!(!controller.load_more().await);

    let held = next_request(&mut requests).await;
    assert_eq!(held.request.offset, 0);
    let _ = held.respond.send(Ok(entries(1, 50)));
    wait_for(&mut rx, |s| s.status == SyncStatus::Ready).await;

    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn refresh_after_scrolling_replaces_deeper_pages() {
    let gateway = BackedGateway::new(500);
    let controller = ListSyncController::new(gateway, SyncOptions::leaderboard());
    let mut rx = controller.subscribe();

    for expected in [50, 100] {
        controller.load_more().await;
        wait_for(&mut rx, |s| s.status == SyncStatus::Ready && s.items.len() == expected).await;
    }

    assert!(controller.refresh().await);
    let refreshing = wait_for(&mut rx, |s| s.status == SyncStatus::Refreshing).await;
    assert_eq!(refreshing.offset, 0);
    assert_eq!(refreshing.generation, 1);

    let ready = wait_for(&mut rx, |s| s.status == SyncStatus::Ready).await;
    assert_eq!(ready.items, entries(1, 50));
    assert_eq!(ready.offset, 50);
}

#[tokio::test]
async fn load_more_arriving_after_refresh_is_discarded() {
    let (gateway, mut requests) = HeldGateway::new();
    let controller = ListSyncController::new(gateway, SyncOptions::leaderboard());
    let mut rx = controller.subscribe();

    controller.start().await;
    let first = next_request(&mut requests).await;
    let _ = first.respond.send(Ok(entries(1, 50)));
    wait_for(&mut rx, |s| s.status == SyncStatus::Ready).await;

    assert!(controller.load_more().await);
    let stale = next_request(&mut requests).await;
    assert_eq!(stale.request.offset, 50);

    assert!(controller.refresh().await);
    let fresh_request = next_request(&mut requests).await;
    assert_eq!(fresh_request.request.offset, 0);

    let mut fresh = entries(1, 50);
    fresh.swap(0, 1);
    fresh[0].rank = 1;
    fresh[1].rank = 2;
    let _ = fresh_request.respond.send(Ok(fresh.clone()));
    wait_for(&mut rx, |s| s.status == SyncStatus::Ready && s.generation == 1).await;

    let _ = stale.respond.send(Ok(entries(51, 50)));
    let_tasks_run().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.items, fresh);
    assert_eq!(snapshot.offset, 50);
}

#[tokio::test]
async fn poll_while_scrolled_deep_does_nothing() {
    let gateway = BackedGateway::new(500);
    let controller = ListSyncController::new(gateway.clone(), SyncOptions::leaderboard());
    let mut rx = controller.subscribe();

    for expected in [50, 100] {
        controller.load_more().await;
        wait_for(&mut rx, |s| s.status == SyncStatus::Ready && s.items.len() == expected).await;
    }
    let before = controller.snapshot().await;

    assert!(!controller.poll().await);
    let_tasks_run().await;

    assert_eq!(gateway.calls(), 2);
    assert_eq!(controller.snapshot().await, before);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn poll_at_top_never_shows_a_loading_state() {
    let gateway = BackedGateway::new(500);
    let controller = ListSyncController::new(gateway.clone(), SyncOptions::leaderboard());
    let mut rx = controller.subscribe();

    controller.start().await;
    let loaded = wait_for(&mut rx, |s| s.status == SyncStatus::Ready).await;

    assert!(controller.poll().await);
    let polling = wait_for(&mut rx, |_| true).await;
    assert_eq!(polling.status, SyncStatus::Polling);
    assert_eq!(polling.items, loaded.items);
    let done = wait_for(&mut rx, |_| true).await;
    assert_eq!(done.status, SyncStatus::Ready);
    assert_eq!(done.generation, loaded.generation);
    assert_eq!(gateway.calls(), 2);
}

#[tokio::test]
async fn empty_search_query_never_reaches_the_network() {
    let (gateway, mut requests) = HeldGateway::new();
    let controller = ListSyncController::new(gateway, SyncOptions::search());
    let mut rx = controller.subscribe();

    assert!(!controller.start().await);
    assert!(!controller.set_query("  ").await);
    let cleared = wait_for(&mut rx, |_| true).await;
    assert_eq!(cleared.status, SyncStatus::Ready);
    assert!(cleared.items.is_empty());
    assert_eq!(cleared.generation, 1);

    let_tasks_run().await;
    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn new_query_discards_results_for_the_old_one() {
    let (gateway, mut requests) = HeldGateway::new();
    let controller = ListSyncController::new(gateway, SyncOptions::search());
    let mut rx = controller.subscribe();

    assert!(controller.set_query("ra").await);
    let old = next_request(&mut requests).await;
    assert_eq!(old.request.query.as_deref(), Some("ra"));

    assert!(controller.set_query("rahul").await);
    let current = next_request(&mut requests).await;
    assert_eq!(current.request.query.as_deref(), Some("rahul"));
    assert_eq!(controller.snapshot().await.generation, 2);

    let _ = old.respond.send(Ok(entries(1, 50)));
    let_tasks_run().await;
    let pending = controller.snapshot().await;
    assert!(pending.items.is_empty());
    assert_eq!(pending.status, SyncStatus::Loading);

    let rahul = vec![RankedEntry::new(7, "rahul", 4_120.0, 33)];
    let _ = current.respond.send(Ok(rahul.clone()));
    let ready = wait_for(&mut rx, |s| s.status == SyncStatus::Ready).await;
    assert_eq!(ready.items, rahul);
    assert_eq!(ready.query.as_deref(), Some("rahul"));
    assert!(!ready.has_more);
}

#[tokio::test]
async fn failed_load_more_keeps_items_and_reports_error() {
    let gateway = BackedGateway::new(500);
    let controller = ListSyncController::new(gateway.clone(), SyncOptions::leaderboard());
    let mut rx = controller.subscribe();

    controller.start().await;
    wait_for(&mut rx, |s| s.status == SyncStatus::Ready).await;

    gateway.failing.store(true, Ordering::SeqCst);
    controller.load_more().await;
    let failed = wait_for(&mut rx, |s| s.status == SyncStatus::Error).await;
    assert_eq!(failed.items.len(), 50);
    assert!(failed
        .error
        .as_deref()
        .expect("message")
        .contains("connection refused"));

    gateway.failing.store(false, Ordering::SeqCst);
    controller.load_more().await;
    let recovered = wait_for(&mut rx, |s| s.status == SyncStatus::Ready).await;
    assert_eq!(recovered.items.len(), 100);
    assert!(recovered.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn focus_drives_the_poll_timer() {
    let gateway = BackedGateway::new(500);
    let controller = ListSyncController::new(
        gateway.clone(),
        SyncOptions::leaderboard().with_poll_interval(Duration::from_secs(5)),
    );

    controller.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.calls(), 1);

    controller.focus_gained().await;
    controller.focus_gained().await;
    assert!(controller.is_polling().await);

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(gateway.calls(), 2);
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(gateway.calls(), 3);

    controller.focus_lost().await;
    assert!(!controller.is_polling().await);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(gateway.calls(), 3);
}

#[tokio::test]
async fn dispose_cancels_polling_and_drops_late_results() {
    let (gateway, mut requests) = HeldGateway::new();
    let controller = ListSyncController::new(gateway, SyncOptions::leaderboard());
    let mut rx = controller.subscribe();

    controller.start().await;
    controller.focus_gained().await;
    let held = next_request(&mut requests).await;
    let loading = wait_for(&mut rx, |_| true).await;
    assert_eq!(loading.status, SyncStatus::Loading);

    controller.dispose().await;
    assert!(!controller.is_polling().await);

    let _ = held.respond.send(Ok(entries(1, 50)));
    let_tasks_run().await;

    let snapshot = controller.snapshot().await;
    assert!(snapshot.items.is_empty());
    assert_eq!(snapshot.status, SyncStatus::Loading);
    assert!(rx.try_recv().is_err());

    assert!(!controller.refresh().await);
    controller.focus_gained().await;
    assert!(!controller.is_polling().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn focus_racing_dispose_never_leaves_a_timer_behind() {
    for _ in 0..200 {
        let controller = ListSyncController::new(
            BackedGateway::new(500),
            SyncOptions::leaderboard().with_poll_interval(Duration::from_millis(10)),
        );

        let focusing = tokio::spawn({
            let controller = controller.clone();
            async move { controller.focus_gained().await }
        });
        let disposing = tokio::spawn({
            let controller = controller.clone();
            async move { controller.dispose().await }
        });
        focusing.await.expect("focus task");
        disposing.await.expect("dispose task");

        assert!(!controller.is_polling().await);
    }
}
