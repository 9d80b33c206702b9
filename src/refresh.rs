use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A periodic background task owned by its handle.
///
/// The task is aborted when the handle is dropped or cancelled, so a timer
/// never outlives whoever started it.
pub struct RefreshTimer {
    handle: JoinHandle<()>,
}

impl RefreshTimer {
    /// Run `task` now and then every `period`. Must be called inside a tokio runtime.
    pub fn spawn<F>(period: Duration, mut task: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                task();
            }
        });
        Self { handle }
    }

    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn ticks_until_dropped() {
        let (count, task) = counter();
        let timer = RefreshTimer::spawn(Duration::from_millis(10), task);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);

        drop(timer);
        tokio::task::yield_now().await;
        let after_drop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn cancel_stops_task() {
        let (count, task) = counter();
        let timer = RefreshTimer::spawn(Duration::from_millis(10), task);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!timer.is_finished());
        timer.cancel();
        tokio::task::yield_now().await;
        let after_cancel = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }
}
