use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};

use crate::handler::BoxedHandler;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

/// What a [`Cors`] unit advertises. Empty lists emit no header.
#[derive(Clone, Debug, Default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Sent as whole seconds on preflight responses when non-zero.
    pub max_age: Option<Duration>,
}

/// Adds `Access-Control-Allow-*` headers and answers preflight requests.
///
/// `OPTIONS` requests never reach the downstream handler; they get
/// `204 No Content` with the CORS headers.
#[derive(Clone)]
pub struct Cors {
    headers: Arc<Vec<(&'static str, String)>>,
    max_age: Option<String>,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        let mut headers = Vec::new();
        for (name, values) in [
            ("Access-Control-Allow-Origin", &config.allowed_origins),
            ("Access-Control-Allow-Methods", &config.allowed_methods),
            ("Access-Control-Allow-Headers", &config.allowed_headers),
        ] {
            if !values.is_empty() {
                headers.push((name, values.join(", ")));
            }
        }
        let max_age = config
            .max_age
            .map(|age| age.as_secs())
            .filter(|secs| *secs > 0)
            .map(|secs| secs.to_string());
        Self { headers: Arc::new(headers), max_age }
    }

    fn decorate(&self, res: &mut Response) {
        for (name, value) in self.headers.iter() {
            res.append_header(*name, value.as_str());
        }
    }
}

impl Middleware for Cors {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let cors = self.clone();
        BoxedHandler::new(move |req: Request| {
            let next = next.clone();
            let cors = cors.clone();
            async move {
                if *req.method() == Method::OPTIONS {
                    let mut res = Response::status(StatusCode::NO_CONTENT);
                    cors.decorate(&mut res);
                    if let Some(age) = &cors.max_age {
                        res.append_header("Access-Control-Max-Age", age.as_str());
                    }
                    return res;
                }
                let mut res = next.call(req).await;
                cors.decorate(&mut res);
                res
            }
        })
    }
}
