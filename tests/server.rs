//! Drives a real server over TCP.

use std::net::SocketAddr;
use std::time::Duration;

use http::Method;
use layover::metrics::{Counter, KeyedCounter, KeyedCounterConfig, Resolver, Timer};
use layover::middleware::NoCache;
use layover::{Request, Response, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

async fn get_user(req: Request) -> Response {
    Response::text(format!("user {}", req.param("id").unwrap_or("?")))
}

async fn echo(req: Request) -> Response {
    Response::json(req.body().to_vec())
}

/// Sends one request with `Connection: close` and returns the raw response.
async fn send(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

fn get(path: &str, extra: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nhost: test\r\n{extra}connection: close\r\n\r\n")
}

#[tokio::test]
async fn metrics_observe_real_traffic() {
    let requests = Counter::new();
    let latency = Timer::new();
    let users = KeyedCounter::new(KeyedCounterConfig { resolver: Resolver::Header("x-user".into()) });

    let router = Router::new()
        .on(Method::GET, "/users/{id}", get_user)
        .on(Method::POST, "/echo", echo)
        .layer(requests.clone())
        .layer(latency.clone())
        .layer(users.clone())
        .layer(NoCache::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(Server::serve_listener(listener, router, shutdown.clone()));

    let res = send(addr, &get("/users/42", "x-user: alice\r\n")).await;
    assert!(res.starts_with("HTTP/1.1 200"), "{res}");
    assert!(res.contains("user 42"));
    assert!(res.to_ascii_lowercase().contains("cache-control: no-cache, no-store, must-revalidate"));

    send(addr, &get("/users/7", "x-user: alice\r\n")).await;
    send(addr, &get("/users/8", "x-user: bob\r\n")).await;

    let res = send(addr, &get("/nowhere", "")).await;
    assert!(res.starts_with("HTTP/1.1 404"), "{res}");

    let body = r#"{"ok":true}"#;
    let res = send(
        addr,
        &format!(
            "POST /echo HTTP/1.1\r\nhost: test\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ),
    )
    .await;
    assert!(res.ends_with(body), "{res}");

    assert_eq!(requests.read(), 5);
    assert_eq!(latency.average().0, 5);
    assert_eq!(users.count("alice"), 2);
    assert_eq!(users.count("bob"), 1);
    assert_eq!(users.count(""), 2);
    assert_eq!(users.distinct_count(), 3);

    shutdown.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn peer_address_identity() {
    let clients = KeyedCounter::new(KeyedCounterConfig { resolver: Resolver::PeerAddr });
    let router = Router::new()
        .on(Method::GET, "/", |_req: Request| async { "hi" })
        .layer(clients.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(Server::serve_listener(listener, router, shutdown.clone()));

    for _ in 0..3 {
        send(addr, &get("/", "")).await;
    }
    assert_eq!(clients.distinct_count(), 1);
    assert_eq!(clients.count("127.0.0.1"), 3);

    shutdown.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_closes_idle_keep_alive_connections() {
    let router = Router::new().on(Method::GET, "/", |_req: Request| async { "hi" });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(Server::serve_listener(listener, router, shutdown.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nhost: test\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    while !String::from_utf8_lossy(&buf).ends_with("hi") {
        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the response");
        buf.extend_from_slice(&chunk[..n]);
    }

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server kept waiting on an idle connection")
        .unwrap()
        .unwrap();

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}
