//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

use request_shield::auth::MemoryIdentityStore;
use request_shield::cache::MemoryCache;
use request_shield::config::ShieldConfig;
use request_shield::http::build_router;
use request_shield::lifecycle::{Components, Shutdown};
use request_shield::testutil::{test_config, ManualClock, RecordingSink};
use request_shield::HttpServer;

pub const START: u64 = 1_700_000_000;
pub const USER: &str = "alice";
pub const PASSWORD: &str = "s3cretpass";

/// Router wired to in-memory collaborators the test can inspect.
pub struct TestApp {
    pub router: Router,
    pub config: ShieldConfig,
    pub components: Components,
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingSink>,
    pub identity: Arc<MemoryIdentityStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ShieldConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let events = Arc::new(RecordingSink::default());
        let identity = Arc::new(MemoryIdentityStore::new());
        identity.insert_subject(USER, PASSWORD, Some("member"));

        let components = Components::build(
            &config,
            Arc::new(MemoryCache::new()),
            identity.clone(),
            clock.clone(),
            events.clone(),
        )
        .unwrap();
        let router = build_router(&config, &components);

        Self {
            router,
            config,
            components,
            clock,
            events,
            identity,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }

    pub async fn login(&self, username: &str, password: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
        self.send(json_request(
            Method::POST,
            "/auth/login",
            None,
            serde_json::json!({ "username": username, "password": password }),
        ))
        .await
    }

    /// Log in as the default user and return `(access, refresh)`.
    pub async fn session(&self) -> (String, String) {
        let (status, _, body) = self.login(USER, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }
}

pub fn json_request(method: Method, uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: Method, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// Serve `config` on an ephemeral port until `shutdown` fires.
pub async fn spawn_server(
    config: ShieldConfig,
    shutdown: &Shutdown,
) -> (SocketAddr, mpsc::UnboundedSender<ShieldConfig>) {
    let identity = Arc::new(MemoryIdentityStore::new());
    identity.insert_subject(USER, PASSWORD, None);
    let components = Components::from_config(&config, identity).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(config, components);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_rx, server_shutdown).await;
    });

    (addr, config_tx)
}
