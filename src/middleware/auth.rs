//! Token authentication.
//!
//! Order of decisions for each request:
//!
//! 1. `POST` to the login path → the login function. `Some(token)` answers
//!    `200` with the token as body, `None` answers `401`.
//! 2. Exact excluded paths and excluded prefixes pass straight through.
//! 3. With a token present: `GET` on the logout path calls the logout
//!    function and answers `200`; otherwise the check function decides.
//! 4. Everything else is `401 Unauthorized`.

use std::sync::Arc;

use http::{Method, StatusCode};

use crate::handler::BoxedHandler;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

pub type LoginFn = Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>;
pub type LogoutFn = Arc<dyn Fn(&str) + Send + Sync>;
/// Called on every authenticated request; keep it cheap.
pub type CheckFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Where the token is read from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization` header, `Bearer ` prefix stripped if present.
    #[default]
    Bearer,
    /// Named header; an empty value counts as absent.
    Header(String),
    Cookie(String),
}

impl TokenSource {
    pub fn extract<'r>(&self, req: &'r Request) -> Option<&'r str> {
        match self {
            Self::Bearer => req
                .header("authorization")
                .filter(|v| !v.is_empty())
                .map(|v| v.strip_prefix("Bearer ").unwrap_or(v)),
            Self::Header(name) => req.header(name).filter(|v| !v.is_empty()),
            Self::Cookie(name) => req.cookie(name),
        }
    }
}

#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token_source: TokenSource,
    /// Without a check function no token is ever accepted.
    pub check: Option<CheckFn>,
    pub login: Option<(String, LoginFn)>,
    pub logout: Option<(String, LogoutFn)>,
    pub excluded_paths: Vec<String>,
    pub excluded_prefixes: Vec<String>,
}

impl AuthConfig {
    pub fn check(mut self, f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.check = Some(Arc::new(f));
        self
    }

    pub fn login(
        mut self,
        path: impl Into<String>,
        f: impl Fn(&Request) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.login = Some((path.into(), Arc::new(f)));
        self
    }

    pub fn logout(mut self, path: impl Into<String>, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.logout = Some((path.into(), Arc::new(f)));
        self
    }

    pub fn exclude_path(mut self, path: impl Into<String>) -> Self {
        self.excluded_paths.push(path.into());
        self
    }

    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }
}

/// Rejects requests without a valid token.
#[derive(Clone)]
pub struct Auth {
    config: Arc<AuthConfig>,
}

impl Auth {
    pub fn new(config: AuthConfig) -> Self {
        Self { config: Arc::new(config) }
    }
}

enum Decision {
    Respond(Response),
    Forward,
}

impl AuthConfig {
    fn decide(&self, req: &Request) -> Decision {
        let path = req.path();

        if let Some((login_path, login)) = &self.login {
            if path == login_path && *req.method() == Method::POST {
                return match login(req) {
                    Some(token) => Decision::Respond(Response::text(token)),
                    None => Decision::Respond(
                        Response::builder()
                            .status(StatusCode::UNAUTHORIZED)
                            .text("authorization failed"),
                    ),
                };
            }
        }

        if self.excluded_paths.iter().any(|p| p == path)
            || self.excluded_prefixes.iter().any(|p| path.starts_with(p.as_str()))
        {
            return Decision::Forward;
        }

        if let Some(token) = self.token_source.extract(req) {
            if let Some((logout_path, logout)) = &self.logout {
                if path == logout_path && *req.method() == Method::GET {
                    logout(token);
                    return Decision::Respond(Response::status(StatusCode::OK));
                }
            }
            if self.check.as_ref().is_some_and(|check| check(token)) {
                return Decision::Forward;
            }
        }

        Decision::Respond(Response::status(StatusCode::UNAUTHORIZED))
    }
}

impl Middleware for Auth {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let config = Arc::clone(&self.config);
        BoxedHandler::new(move |req: Request| {
            let next = next.clone();
            let decision = config.decide(&req);
            async move {
                match decision {
                    Decision::Respond(res) => res,
                    Decision::Forward => next.call(req).await,
                }
            }
        })
    }
}
