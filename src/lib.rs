//! # layover
//!
//! Composable HTTP middleware with request metrics that stay correct under
//! concurrent traffic.
//!
//! ## The contract
//!
//! Every middleware unit does one thing: take the downstream handler and
//! return a handler that runs extra logic around it
//! ([`middleware::Middleware`]). Units are stacked with a
//! [`middleware::Chain`] or [`Router::layer`], composed once at startup.
//!
//! What ships in the box:
//!
//! - **Metrics**: [`metrics::Counter`], [`metrics::Timer`],
//!   [`metrics::KeyedCounter`], with atomic read-and-reset and periodic
//!   [`metrics::Emitter`]s
//! - **Headers**: fixed and per-request headers, `no-cache` preset
//! - **CORS**: allow-lists and preflight answers
//! - **Auth**: bearer / header / cookie tokens, login and logout paths
//! - **Health gating**: refuse traffic while a check fails
//! - **Splitting**: dispatch on the first path segment under a prefix
//!
//! What it leaves to the proxy in front: TLS, rate limiting, body limits.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use http::Method;
//! use layover::metrics::{Counter, Emitter, EmitterConfig, ReadMode, Timer};
//! use layover::middleware::NoCache;
//! use layover::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), layover::Error> {
//!     let requests = Counter::new();
//!     let latency = Timer::new();
//!
//!     let _emitter = Emitter::spawn(
//!         requests.clone(),
//!         EmitterConfig::new(Duration::from_secs(60), ReadMode::Reset),
//!         |e| tracing::info!(requests = e.value, "last minute"),
//!     )?;
//!
//!     let app = Router::new()
//!         .on(Method::GET, "/users/{id}", get_user)
//!         .layer(requests)
//!         .layer(latency)
//!         .layer(NoCache::new());
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod splitter;

pub mod metrics;
pub mod middleware;

pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, Handler};
pub use request::{Request, RequestBuilder};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use splitter::Splitter;
