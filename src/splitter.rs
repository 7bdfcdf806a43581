//! Dispatch on the first path segment below a prefix.
//!
//! ```text
//! Splitter with prefix "/api" and splits "users", "orders":
//!
//!   /api/users/42   → users handler sees  /42
//!   /api/orders     → orders handler sees (empty path)
//!   /api/other/1    → default handler sees /api/other/1
//!   /elsewhere      → 404
//! ```

use std::collections::HashMap;

use http::StatusCode;

use crate::handler::{BoxedHandler, Handler, private};
use crate::request::Request;
use crate::response::Response;

/// Routes requests under `prefix` by their next path segment.
#[derive(Clone, Debug, Default)]
pub struct Splitter {
    prefix: String,
    splits: HashMap<String, BoxedHandler>,
    default: Option<BoxedHandler>,
}

impl Splitter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), ..Self::default() }
    }

    pub fn split(mut self, segment: impl Into<String>, handler: impl Handler) -> Self {
        self.splits.insert(segment.into(), handler.into_boxed_handler());
        self
    }

    /// Receives requests under the prefix whose segment has no split, with
    /// the original path.
    pub fn default_handler(mut self, handler: impl Handler) -> Self {
        self.default = Some(handler.into_boxed_handler());
        self
    }

    async fn dispatch(&self, mut req: Request) -> Response {
        let Some(rest) = req.path().strip_prefix(self.prefix.as_str()) else {
            return Response::status(StatusCode::NOT_FOUND);
        };
        let (segment, remainder) = pop_segment(rest);

        if let Some(handler) = self.splits.get(segment) {
            let remainder = remainder.to_owned();
            req.set_path(remainder);
            return handler.call(req).await;
        }
        match &self.default {
            Some(handler) => handler.call(req).await,
            None => Response::status(StatusCode::NOT_FOUND),
        }
    }
}

/// Splits `/a/b/c` into `("a", "/b/c")` and `/a` into `("a", "")`. The
/// remainder keeps any trailing slash.
fn pop_segment(path: &str) -> (&str, &str) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.find('/') {
        Some(i) => (&trimmed[..i], &trimmed[i..]),
        None => (trimmed, ""),
    }
}

impl private::Sealed for Splitter {}

impl Handler for Splitter {
    fn into_boxed_handler(self) -> BoxedHandler {
        let splitter = std::sync::Arc::new(self);
        BoxedHandler::new(move |req: Request| {
            let splitter = std::sync::Arc::clone(&splitter);
            async move { splitter.dispatch(req).await }
        })
    }
}
