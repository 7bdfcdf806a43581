use std::sync::Arc;

use crate::handler::BoxedHandler;
use crate::middleware::Middleware;
use crate::request::Request;

/// Computes a `(name, value)` header pair from the incoming request.
pub type DynamicHeaderFn = Arc<dyn Fn(&Request) -> (String, String) + Send + Sync>;

/// Headers to add to every response.
#[derive(Clone, Default)]
pub struct HeaderConfig {
    /// Fixed pairs, added in order.
    pub fixed: Vec<(String, String)>,
    /// Resolved per request, added after the fixed ones.
    pub dynamic: Vec<DynamicHeaderFn>,
}

impl HeaderConfig {
    pub fn fixed(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed.push((name.into(), value.into()));
        self
    }

    pub fn dynamic(
        mut self,
        f: impl Fn(&Request) -> (String, String) + Send + Sync + 'static,
    ) -> Self {
        self.dynamic.push(Arc::new(f));
        self
    }
}

/// Appends configured headers to the downstream response.
///
/// Dynamic headers are resolved before the request is handed on, since the
/// downstream handler consumes it.
#[derive(Clone)]
pub struct Header {
    config: Arc<HeaderConfig>,
}

impl Header {
    pub fn new(config: HeaderConfig) -> Self {
        Self { config: Arc::new(config) }
    }
}

impl Middleware for Header {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let config = Arc::clone(&self.config);
        BoxedHandler::new(move |req: Request| {
            let next = next.clone();
            let resolved: Vec<_> = config.dynamic.iter().map(|f| f(&req)).collect();
            let fixed = Arc::clone(&config);
            async move {
                let mut res = next.call(req).await;
                for (name, value) in &fixed.fixed {
                    res.append_header(name.as_str(), value.as_str());
                }
                for (name, value) in resolved {
                    res.append_header(name, value);
                }
                res
            }
        })
    }
}

/// Tells clients and proxies not to cache the response.
#[derive(Clone)]
pub struct NoCache(Header);

impl NoCache {
    pub fn new() -> Self {
        Self(Header::new(
            HeaderConfig::default()
                .fixed("Cache-Control", "no-cache, no-store, must-revalidate")
                .fixed("Pragma", "no-cache")
                .fixed("Expires", "0"),
        ))
    }
}

impl Default for NoCache {
    fn default() -> Self { Self::new() }
}

impl Middleware for NoCache {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self.0.wrap(next)
    }
}
