use std::time::Duration;

use futures::future::BoxFuture;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

pub type TickFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Creates periodic tasks. The returned handle owns the task: cancelling or
/// dropping it stops further ticks.
pub trait PollScheduler: Send + Sync {
    fn schedule_every(&self, period: Duration, tick: TickFn) -> PollHandle;
}

pub struct PollHandle {
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs ticks on the ambient tokio runtime. The first tick fires one full
/// period after scheduling; missed ticks are skipped rather than bunched.
pub struct TokioPollScheduler;

impl PollScheduler for TokioPollScheduler {
    fn schedule_every(&self, period: Duration, tick: TickFn) -> PollHandle {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                tick().await;
            }
        });
        PollHandle::from_task(task)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use futures::FutureExt;

    use super::*;

    fn counting_tick(counter: Arc<AtomicUsize>) -> TickFn {
        Box::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_after_each_full_period() {
        let counter = Arc::new(AtomicUsize::new(0));
        let _handle =
            TokioPollScheduler.schedule_every(Duration::from_secs(5), counting_tick(counter.clone()));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_handle_stops_ticking() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handle =
            TokioPollScheduler.schedule_every(Duration::from_secs(1), counting_tick(counter.clone()));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle.cancel();
        assert!(!handle.is_active());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_ticking() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle =
            TokioPollScheduler.schedule_every(Duration::from_secs(1), counting_tick(counter.clone()));
        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
