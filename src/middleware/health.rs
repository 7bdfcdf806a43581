use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

/// Construction parameters for [`HealthGate`].
#[derive(Clone)]
pub struct HealthConfig {
    pub check: Arc<dyn Fn() -> bool + Send + Sync>,
    /// Status sent while unhealthy.
    pub status: StatusCode,
    pub message: String,
    /// `None` runs the check on every request. `Some(d)` runs it in the
    /// background every `d` and serves the last result.
    pub interval: Option<Duration>,
    /// Stops the background checker.
    pub shutdown: CancellationToken,
}

impl HealthConfig {
    pub fn new(check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            check: Arc::new(check),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: String::new(),
            interval: None,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Refuses traffic while a health check fails.
#[derive(Clone)]
pub struct HealthGate {
    config: Arc<HealthConfig>,
    cached: Option<Arc<AtomicBool>>,
}

impl HealthGate {
    /// Validates `config` and, for interval checks, starts the background
    /// checker on the current tokio runtime.
    pub fn new(config: HealthConfig) -> Result<Self, Error> {
        let Some(interval) = config.interval else {
            return Ok(Self { config: Arc::new(config), cached: None });
        };
        if interval.is_zero() {
            return Err(Error::InvalidConfig("health check interval must be non-zero"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let healthy = Arc::new(AtomicBool::new(true));
        let check = Arc::clone(&config.check);
        let shutdown = config.shutdown.clone();
        let flag = Arc::clone(&healthy);
        runtime.spawn(async move {
            loop {
                let now_healthy = check();
                if flag.swap(now_healthy, Ordering::Relaxed) != now_healthy {
                    warn!(healthy = now_healthy, "health state changed");
                }
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            debug!("health checker stopped");
        });

        Ok(Self { config: Arc::new(config), cached: Some(healthy) })
    }

    fn healthy(&self) -> bool {
        match &self.cached {
            Some(flag) => flag.load(Ordering::Relaxed),
            None => (self.config.check)(),
        }
    }
}

impl Middleware for HealthGate {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let gate = self.clone();
        BoxedHandler::new(move |req: Request| {
            let next = next.clone();
            let healthy = gate.healthy();
            let config = Arc::clone(&gate.config);
            async move {
                if !healthy {
                    return Response::builder()
                        .status(config.status)
                        .text(config.message.as_str());
                }
                next.call(req).await
            }
        })
    }
}
