use std::sync::Arc;

use parking_lot::Mutex;

use crate::handler::BoxedHandler;
use crate::metrics::Source;
use crate::middleware::Middleware;
use crate::request::Request;

/// Counts requests that pass through it.
///
/// `Counter` is a handle: clones share the same count, so the same counter
/// can be placed in a [`Chain`](crate::middleware::Chain) and handed to an
/// [`Emitter`](crate::metrics::Emitter). The count is bumped after the
/// downstream handler returns.
#[derive(Clone, Debug, Default)]
pub struct Counter {
    count: Arc<Mutex<u64>>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        *self.count.lock() += 1;
    }

    pub fn read(&self) -> u64 {
        *self.count.lock()
    }

    /// Returns the count and sets it to zero in one critical section.
    pub fn read_and_reset(&self) -> u64 {
        std::mem::take(&mut *self.count.lock())
    }
}

impl Middleware for Counter {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let counter = self.clone();
        BoxedHandler::new(move |req: Request| {
            let next = next.clone();
            let counter = counter.clone();
            async move {
                let res = next.call(req).await;
                counter.increment();
                res
            }
        })
    }
}

impl Source for Counter {
    type Snapshot = u64;

    fn peek(&self) -> u64 { self.read() }
    fn take(&self) -> u64 { self.read_and_reset() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_then_reset() {
        let counter = Counter::new();
        for _ in 0..3 {
            counter.increment();
        }
        assert_eq!(counter.read(), 3);
        assert_eq!(counter.read_and_reset(), 3);
        assert_eq!(counter.read(), 0);
    }

    #[tokio::test]
    async fn counts_every_wrapped_call() {
        let counter = Counter::new();
        let wrapped = counter.wrap(BoxedHandler::new(|_req: Request| async { "ok" }));

        for round in 1..=5u64 {
            let n = round * 37;
            for _ in 0..n {
                wrapped.call(Request::builder().build()).await;
            }
            assert_eq!(counter.read(), n);
            counter.read_and_reset();
            assert_eq!(counter.read(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let counter = Counter::new();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let counter = counter.clone();
            tasks.spawn(async move {
                for _ in 0..1_000 {
                    counter.increment();
                }
            });
        }
        while tasks.join_next().await.is_some() {}
        assert_eq!(counter.read(), 16_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn resets_under_contention_partition_the_total() {
        let counter = Counter::new();
        let mut writers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let counter = counter.clone();
            writers.spawn(async move {
                for i in 0..2_000 {
                    counter.increment();
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            });
        }

        let mut drained = 0;
        while !writers.is_empty() {
            drained += counter.read_and_reset();
            if writers.try_join_next().is_none() {
                tokio::task::yield_now().await;
            }
        }
        drained += counter.read_and_reset();
        assert_eq!(drained, 16_000);
    }
}
