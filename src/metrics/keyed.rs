use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handler::BoxedHandler;
use crate::metrics::Source;
use crate::middleware::Middleware;
use crate::request::Request;

/// How a [`KeyedCounter`] turns a request into an identity.
///
/// A resolver that finds nothing yields the empty string, so every
/// unresolvable request lands in the same `""` bucket. Callers that need to
/// tell "anonymous" apart from "lookup failed" should use
/// [`Resolver::Custom`] and encode the difference in the returned key.
#[derive(Clone, Default)]
pub enum Resolver {
    /// Every request is the same (empty) identity.
    #[default]
    Anonymous,
    /// Value of the named request header.
    Header(String),
    /// Value of the named cookie.
    Cookie(String),
    /// Peer IP address without the port.
    PeerAddr,
    Custom(Arc<dyn Fn(&Request) -> String + Send + Sync>),
}

impl Resolver {
    /// Identity from the `Authorization` header.
    pub fn authorization() -> Self {
        Self::Header("authorization".to_owned())
    }

    pub fn custom(f: impl Fn(&Request) -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn resolve(&self, req: &Request) -> String {
        match self {
            Self::Anonymous => String::new(),
            Self::Header(name) => req.header(name).unwrap_or_default().to_owned(),
            Self::Cookie(name) => req.cookie(name).unwrap_or_default().to_owned(),
            Self::PeerAddr => req
                .remote_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
            Self::Custom(f) => f(req),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Header(name) => f.debug_tuple("Header").field(name).finish(),
            Self::Cookie(name) => f.debug_tuple("Cookie").field(name).finish(),
            Self::PeerAddr => f.write_str("PeerAddr"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Construction parameters for [`KeyedCounter`].
#[derive(Clone, Debug, Default)]
pub struct KeyedCounterConfig {
    pub resolver: Resolver,
}

/// Identity → count map read out of a [`KeyedCounter`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyedSnapshot {
    pub counts: HashMap<String, u64>,
}

impl KeyedSnapshot {
    pub fn distinct_count(&self) -> u64 {
        self.counts.len() as u64
    }

    /// Sum of all per-identity counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Counts requests per resolved identity (user, client address, ...).
///
/// Hits are recorded before the downstream handler runs. Clones share state.
#[derive(Clone, Debug)]
pub struct KeyedCounter {
    counts: Arc<Mutex<HashMap<String, u64>>>,
    resolver: Resolver,
}

impl KeyedCounter {
    pub fn new(config: KeyedCounterConfig) -> Self {
        Self {
            counts: Arc::new(Mutex::new(HashMap::new())),
            resolver: config.resolver,
        }
    }

    pub fn resolve(&self, req: &Request) -> String {
        self.resolver.resolve(req)
    }

    pub fn record_hit(&self, req: &Request) {
        let identity = self.resolve(req);
        self.record(identity);
    }

    /// Adds one hit for an already-resolved identity.
    pub fn record(&self, identity: String) {
        *self.counts.lock().entry(identity).or_insert(0) += 1;
    }

    /// Zero for identities never seen.
    pub fn count(&self, identity: &str) -> u64 {
        self.counts.lock().get(identity).copied().unwrap_or(0)
    }

    /// Number of identities present, including ones reset to zero.
    pub fn distinct_count(&self) -> u64 {
        self.counts.lock().len() as u64
    }

    /// Sets one identity back to zero. The identity stays present; an
    /// identity never seen is not added.
    pub fn reset_one(&self, identity: &str) {
        if let Some(count) = self.counts.lock().get_mut(identity) {
            *count = 0;
        }
    }

    /// Forgets every identity.
    pub fn reset_all(&self) {
        self.counts.lock().clear();
    }

    pub fn snapshot(&self) -> KeyedSnapshot {
        KeyedSnapshot { counts: self.counts.lock().clone() }
    }

    /// Returns the whole map and leaves an empty one, in one critical section.
    pub fn read_and_reset(&self) -> KeyedSnapshot {
        KeyedSnapshot { counts: std::mem::take(&mut *self.counts.lock()) }
    }
}

impl Default for KeyedCounter {
    fn default() -> Self {
        Self::new(KeyedCounterConfig::default())
    }
}

impl Middleware for KeyedCounter {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let counter = self.clone();
        BoxedHandler::new(move |req: Request| {
            let next = next.clone();
            counter.record_hit(&req);
            async move { next.call(req).await }
        })
    }
}

impl Source for KeyedCounter {
    type Snapshot = KeyedSnapshot;

    fn peek(&self) -> KeyedSnapshot { self.snapshot() }
    fn take(&self) -> KeyedSnapshot { self.read_and_reset() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn with_resolver(resolver: Resolver) -> KeyedCounter {
        KeyedCounter::new(KeyedCounterConfig { resolver })
    }

    #[tokio::test]
    async fn no_resolver_collapses_to_one_bucket() {
        let counter = KeyedCounter::default();
        let wrapped = counter.wrap(BoxedHandler::new(|_req: Request| async { "ok" }));
        for _ in 0..1_000 {
            wrapped.call(Request::builder().build()).await;
        }
        assert_eq!(counter.distinct_count(), 1);
        assert_eq!(counter.count(""), 1_000);
    }

    #[tokio::test]
    async fn peer_addr_strips_port() {
        let counter = with_resolver(Resolver::PeerAddr);
        let wrapped = counter.wrap(BoxedHandler::new(|_req: Request| async { "ok" }));
        for _ in 0..100 {
            for ip in 0..10 {
                let addr: SocketAddr = format!("10.0.0.{ip}:{}", 40_000 + ip).parse().unwrap();
                let req = Request::builder().remote_addr(addr).build();
                wrapped.call(req).await;
            }
        }

        assert_eq!(counter.distinct_count(), 10);
        for ip in 0..10 {
            assert_eq!(counter.count(&format!("10.0.0.{ip}")), 100);
        }
    }

    #[test]
    fn header_and_cookie_resolvers() {
        let header = with_resolver(Resolver::authorization());
        header.record_hit(&Request::builder().header("Authorization", "Bearer a").build());
        header.record_hit(&Request::builder().header("authorization", "Bearer a").build());
        header.record_hit(&Request::builder().build());
        assert_eq!(header.count("Bearer a"), 2);
        assert_eq!(header.count(""), 1);

        let cookie = with_resolver(Resolver::Cookie("session".to_owned()));
        for _ in 0..5 {
            cookie.record_hit(&Request::builder().build());
            cookie.record_hit(&Request::builder().header("cookie", "other=1").build());
        }
        cookie.record_hit(&Request::builder().header("cookie", "session=s1").build());
        assert_eq!(cookie.distinct_count(), 2);
        assert_eq!(cookie.count(""), 10);
        assert_eq!(cookie.count("s1"), 1);
    }

    #[test]
    fn custom_resolver() {
        let counter = with_resolver(Resolver::custom(|req| {
            req.header("x-tenant").map_or_else(|| "anon".to_owned(), |t| format!("t:{t}"))
        }));
        counter.record_hit(&Request::builder().header("x-tenant", "acme").build());
        counter.record_hit(&Request::builder().build());
        assert_eq!(counter.count("t:acme"), 1);
        assert_eq!(counter.count("anon"), 1);
    }

    #[test]
    fn reset_one_keeps_key_reset_all_drops_everything() {
        let counter = KeyedCounter::default();
        for id in ["a", "b", "c"] {
            for _ in 0..4 {
                counter.record(id.to_owned());
            }
        }
        assert_eq!(counter.distinct_count(), 3);
        assert_eq!(counter.count("b"), 4);

        counter.reset_one("b");
        assert_eq!(counter.count("b"), 0);
        assert_eq!(counter.count("a"), 4);
        assert_eq!(counter.distinct_count(), 3);

        counter.reset_one("never-seen");
        assert_eq!(counter.distinct_count(), 3);

        counter.reset_all();
        assert_eq!(counter.distinct_count(), 0);
        assert_eq!(counter.count("a"), 0);
    }

    #[test]
    fn read_and_reset_hands_over_the_map() {
        let counter = KeyedCounter::default();
        counter.record("x".to_owned());
        counter.record("x".to_owned());
        counter.record("y".to_owned());

        let snapshot = counter.read_and_reset();
        assert_eq!(snapshot.distinct_count(), 2);
        assert_eq!(snapshot.total(), 3);
        assert_eq!(counter.distinct_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_sightings_are_not_lost() {
        let counter = KeyedCounter::default();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let counter = counter.clone();
            tasks.spawn(async move {
                for id in 0..50 {
                    counter.record(format!("user-{id}"));
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(counter.distinct_count(), 50);
        for id in 0..50 {
            assert_eq!(counter.count(&format!("user-{id}")), 8);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn drains_under_contention_partition_every_identity() {
        let counter = KeyedCounter::default();
        let mut writers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let counter = counter.clone();
            writers.spawn(async move {
                for i in 0..2_000 {
                    counter.record(format!("user-{}", i % 10));
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            });
        }

        let mut drained: HashMap<String, u64> = HashMap::new();
        let mut absorb = |snapshot: KeyedSnapshot| {
            for (id, n) in snapshot.counts {
                *drained.entry(id).or_default() += n;
            }
        };
        while !writers.is_empty() {
            absorb(counter.read_and_reset());
            if writers.try_join_next().is_none() {
                tokio::task::yield_now().await;
            }
        }
        absorb(counter.read_and_reset());

        assert_eq!(drained.values().sum::<u64>(), 16_000);
        assert_eq!(drained.len(), 10);
        assert!(drained.values().all(|n| *n == 1_600));
    }
}
