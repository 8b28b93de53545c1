//! Timer trigger state

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tm_core::TimerData;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Tick counter and task handle of a timer trigger
#[derive(Debug)]
pub struct TimerState {
    interval: Duration,
    limit: Option<u64>,
    count: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TimerState {
    pub fn new(interval: Duration, limit: Option<u64>) -> Self {
        Self {
            interval,
            limit,
            count: AtomicU64::new(0),
            started_at: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether a tick task is alive
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().map(|t| !t.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Install a freshly spawned tick task, starting the count from zero
    pub fn begin(&self, task: JoinHandle<()>) {
        self.count.store(0, Ordering::SeqCst);
        if let Ok(mut started_at) = self.started_at.lock() {
            *started_at = Some(Instant::now());
        }
        if let Ok(mut slot) = self.task.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    /// Advance to the next tick, or `None` once the run limit is reached
    pub fn next_tick(&self, page_start: Instant) -> Option<TimerData> {
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| match self.limit {
                Some(limit) if count >= limit => None,
                _ => Some(count + 1),
            })
            .ok()?;

        let now = Instant::now();
        let started_at = self
            .started_at
            .lock()
            .ok()
            .and_then(|s| *s)
            .unwrap_or(page_start);

        Some(TimerData {
            count: previous + 1,
            interval_ms: millis(self.interval),
            elapsed_ms: millis(now.duration_since(started_at)),
            total_ms: millis(now.duration_since(page_start)),
        })
    }

    /// Abort the tick task and clear the counters
    pub fn stop(&self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        if let Ok(mut started_at) = self.started_at.lock() {
            *started_at = None;
        }
        self.count.store(0, Ordering::SeqCst);
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_next_tick_counts_until_limit() {
        let page_start = Instant::now();
        let timer = TimerState::new(Duration::from_millis(500), Some(2));
        timer.begin(tokio::spawn(async {}));

        tokio::time::advance(Duration::from_millis(500)).await;
        let first = timer.next_tick(page_start).unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.interval_ms, 500);
        assert_eq!(first.elapsed_ms, 500);

        let second = timer.next_tick(page_start).unwrap();
        assert_eq!(second.count, 2);
        assert!(timer.next_tick(page_start).is_none());
        assert_eq!(timer.count(), 2);
    }

    #[tokio::test]
    async fn test_stop_aborts_task() {
        let timer = TimerState::new(Duration::from_secs(1), None);
        timer.begin(tokio::spawn(std::future::pending::<()>()));
        assert!(timer.is_running());

        timer.stop();
        assert!(!timer.is_running());
        assert_eq!(timer.count(), 0);
    }
}
