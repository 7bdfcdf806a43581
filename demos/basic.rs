//! Minimal layover example: a couple of routes behind the middleware stack,
//! with metrics emitted to the log every 10 seconds.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42 -H 'x-user: alice'
//!   curl -X POST http://localhost:3000/login -d 'letmein'
//!   curl http://localhost:3000/admin -H 'authorization: Bearer demo-token'
//!   curl http://localhost:3000/api/reports/weekly

use std::time::Duration;

use http::{Method, StatusCode};
use layover::metrics::{
    Counter, Emitter, EmitterConfig, KeyedCounter, KeyedCounterConfig, ReadMode, Resolver, Timer,
};
use layover::middleware::{Auth, AuthConfig, Cors, CorsConfig, NoCache};
use layover::{Request, Response, Router, Server, Splitter};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), layover::Error> {
    tracing_subscriber::fmt::init();

    let shutdown = CancellationToken::new();
    let requests = Counter::new();
    let latency = Timer::new();
    let users = KeyedCounter::new(KeyedCounterConfig { resolver: Resolver::Header("x-user".into()) });

    let every = Duration::from_secs(10);
    let emitters = [
        Emitter::spawn(
            requests.clone(),
            EmitterConfig::new(every, ReadMode::Reset).with_shutdown(shutdown.child_token()),
            |e| tracing::info!(at = %e.timestamp, requests = e.value, "request count"),
        )?,
        Emitter::spawn(
            latency.clone(),
            EmitterConfig::new(every, ReadMode::Reset).with_shutdown(shutdown.child_token()),
            |e| tracing::info!(count = e.value.count, avg = ?e.value.average(), "latency"),
        )?,
        Emitter::spawn(
            users.clone(),
            EmitterConfig::new(every, ReadMode::Peek).with_shutdown(shutdown.child_token()),
            |e| tracing::info!(distinct = e.value.distinct_count(), "users seen"),
        )?,
    ];

    let auth = Auth::new(
        AuthConfig::default()
            .check(|token| token == "demo-token")
            .login("/login", |req| (req.body() == b"letmein").then(|| "demo-token".to_owned()))
            .exclude_prefix("/users/")
            .exclude_prefix("/api/"),
    );

    let api = Splitter::new("/api")
        .split("reports", |req: Request| async move {
            Response::text(format!("report {}", req.path()))
        })
        .default_handler(|_req: Request| async { StatusCode::NOT_FOUND });

    let app = Router::new()
        .on(Method::GET, "/users/{id}", get_user)
        .on(Method::GET, "/admin", |_req: Request| async { "welcome, admin" })
        .on(Method::GET, "/api/{*rest}", api)
        .layer(requests)
        .layer(latency)
        .layer(users)
        .layer(Cors::new(CorsConfig {
            allowed_origins: vec!["*".into()],
            ..CorsConfig::default()
        }))
        .layer(auth)
        .layer(NoCache::new());

    let served = Server::bind("0.0.0.0:3000")?.serve(app).await;

    shutdown.cancel();
    for emitter in emitters {
        emitter.shutdown().await;
    }
    served
}

async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}
