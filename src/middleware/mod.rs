//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: metrics, header injection, CORS, authentication.
//! Every unit implements one contract, [`Middleware::wrap`]: given the
//! downstream handler, return a handler that runs extra logic around it.
//!
//! Units are composed with a [`Chain`], once, at build time:
//!
//! ```rust,no_run
//! use layover::middleware::{Chain, Cors, CorsConfig, NoCache};
//! use layover::metrics::Counter;
//! use layover::{BoxedHandler, Request, Response};
//!
//! async fn hello(_req: Request) -> Response { Response::text("hello") }
//!
//! let requests = Counter::new();
//! let app: BoxedHandler = Chain::new()
//!     .with(requests.clone())                // sees the request first
//!     .with(Cors::new(CorsConfig::default()))
//!     .with(NoCache::new())                   // closest to `hello`
//!     .wrap(BoxedHandler::new(hello));
//! ```
//!
//! Built-in metrics units live in [`crate::metrics`].

mod auth;
mod cors;
mod health;
mod header;

use std::sync::Arc;

use crate::handler::BoxedHandler;

pub use auth::{Auth, AuthConfig, CheckFn, LoginFn, LogoutFn, TokenSource};
pub use cors::{Cors, CorsConfig};
pub use header::{DynamicHeaderFn, Header, HeaderConfig, NoCache};
pub use health::{HealthConfig, HealthGate};

/// The handler → handler contract every middleware unit satisfies.
///
/// A unit may keep state of its own (counters, configuration); the wrapped
/// handler it returns closes over that state, not over the chain.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (**self).wrap(next)
    }
}

/// An ordered list of middleware units, applied outermost-first.
///
/// Unit 0 sees the request first and the response last. Composing is done
/// by [`Chain::wrap`]; do it once and reuse the returned handler.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Appends a unit inside every unit added so far.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub(crate) fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(middleware);
    }

    pub fn len(&self) -> usize { self.layers.len() }
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    /// Builds the composed handler around `handler`.
    pub fn wrap(&self, handler: BoxedHandler) -> BoxedHandler {
        // Innermost first, so that layers[0] ends up outermost.
        self.layers
            .iter()
            .rev()
            .fold(handler, |next, layer| layer.wrap(next))
    }
}

impl Middleware for Chain {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Chain::wrap(self, next)
    }
}
