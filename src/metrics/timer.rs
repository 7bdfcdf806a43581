use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::handler::BoxedHandler;
use crate::metrics::Source;
use crate::middleware::Middleware;
use crate::request::Request;

/// Number of observations and their summed duration, read together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total: Duration,
}

impl TimerSnapshot {
    /// Mean duration, or zero when there are no samples.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Accumulates how long the downstream handler took.
///
/// Count and total are always updated in the same critical section, so a
/// reader never sees one without the other. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct Timer {
    state: Arc<Mutex<TimerSnapshot>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        let mut state = self.state.lock();
        state.count += 1;
        state.total = state.total.saturating_add(elapsed);
    }

    /// `(count, mean)`. A count of zero means no data; a count of one with a
    /// zero mean is a single instantaneous sample.
    pub fn average(&self) -> (u64, Duration) {
        let snapshot = *self.state.lock();
        (snapshot.count, snapshot.average())
    }

    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        *self.state.lock()
    }

    /// Returns `(count, total)` and clears both in one critical section.
    pub fn read_and_reset(&self) -> TimerSnapshot {
        std::mem::take(&mut *self.state.lock())
    }
}

impl Middleware for Timer {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Timing::new([self.clone()]).wrap(next)
    }
}

impl Source for Timer {
    type Snapshot = TimerSnapshot;

    fn peek(&self) -> TimerSnapshot { self.snapshot() }
    fn take(&self) -> TimerSnapshot { self.read_and_reset() }
}

/// Times the downstream handler once and records the elapsed duration into
/// several timers, e.g. one per route plus a global one.
///
/// Recording happens inline after the handler returns; each timer is
/// updated under its own lock.
#[derive(Clone, Debug)]
pub struct Timing {
    timers: Arc<[Timer]>,
}

impl Timing {
    pub fn new(timers: impl IntoIterator<Item = Timer>) -> Self {
        Self { timers: timers.into_iter().collect() }
    }
}

impl Middleware for Timing {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let timers = Arc::clone(&self.timers);
        BoxedHandler::new(move |req: Request| {
            let next = next.clone();
            let timers = Arc::clone(&timers);
            async move {
                let start = Instant::now();
                let res = next.call(req).await;
                let elapsed = start.elapsed();
                for timer in timers.iter() {
                    timer.record(elapsed);
                }
                res
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timer_averages_to_zero() {
        let timer = Timer::new();
        assert_eq!(timer.average(), (0, Duration::ZERO));
    }

    #[test]
    fn average_is_total_over_count() {
        let timer = Timer::new();
        for ms in [10, 20, 30, 40] {
            timer.record(Duration::from_millis(ms));
        }
        assert_eq!(timer.average(), (4, Duration::from_millis(25)));

        let snapshot = timer.read_and_reset();
        assert_eq!(snapshot.count, 4);
        assert_eq!(snapshot.total, Duration::from_millis(100));
        assert_eq!(timer.average(), (0, Duration::ZERO));
    }

    #[test]
    fn single_zero_sample_is_not_no_data() {
        let timer = Timer::new();
        timer.record(Duration::ZERO);
        assert_eq!(timer.average(), (1, Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn wrapped_handler_time_is_recorded() {
        let timer = Timer::new();
        let wrapped = timer.wrap(BoxedHandler::new(|_req: Request| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            "ok"
        }));

        for _ in 0..10 {
            wrapped.call(Request::builder().build()).await;
        }

        let (count, avg) = timer.average();
        assert_eq!(count, 10);
        assert!(avg >= Duration::from_millis(50), "avg too low: {avg:?}");
    }

    #[tokio::test]
    async fn timing_feeds_every_timer() {
        let route = Timer::new();
        let global = Timer::new();
        let wrapped = Timing::new([route.clone(), global.clone()])
            .wrap(BoxedHandler::new(|_req: Request| async { "ok" }));

        for _ in 0..7 {
            wrapped.call(Request::builder().build()).await;
        }
        assert_eq!(route.count(), 7);
        assert_eq!(global.count(), 7);
        assert_eq!(route.snapshot().total, global.snapshot().total);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_keep_pairs_consistent() {
        let timer = Timer::new();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let timer = timer.clone();
            tasks.spawn(async move {
                for _ in 0..500 {
                    timer.record(Duration::from_millis(2));
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.count, 4_000);
        assert_eq!(snapshot.total, Duration::from_millis(8_000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn drains_under_contention_partition_count_and_total() {
        let timer = Timer::new();
        let mut writers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let timer = timer.clone();
            writers.spawn(async move {
                for i in 0..2_000 {
                    timer.record(Duration::from_micros(3));
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            });
        }

        let mut count = 0;
        let mut total = Duration::ZERO;
        while !writers.is_empty() {
            let snapshot = timer.read_and_reset();
            assert_eq!(snapshot.total, Duration::from_micros(3) * snapshot.count as u32);
            count += snapshot.count;
            total += snapshot.total;
            if writers.try_join_next().is_none() {
                tokio::task::yield_now().await;
            }
        }
        let rest = timer.read_and_reset();
        count += rest.count;
        total += rest.total;

        assert_eq!(count, 16_000);
        assert_eq!(total, Duration::from_micros(48_000));
    }
}
