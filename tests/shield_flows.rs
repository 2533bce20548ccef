//! End-to-end flows through the router and the security pipeline.

use axum::http::{Method, StatusCode};
use serde_json::json;

use request_shield::observability::SecurityEventType;

mod common;

use common::{empty_request, json_request, TestApp, PASSWORD, USER};

#[tokio::test]
async fn test_login_rate_limit_counts_every_attempt() {
    let app = TestApp::new();

    let (status, _, _) = app.login(USER, PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    for _ in 0..4 {
        let (status, _, body) = app.login(USER, "wrongpass").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["correlation_id"].is_string());
    }

    let (status, headers, body) = app.login(USER, PASSWORD).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 900);
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["rate_limit"]["remaining"], 0);
    assert!(body["rate_limit"]["reset_at"].as_u64().unwrap() <= common::START + 900);
    assert_eq!(app.events.count(SecurityEventType::RateLimitExceeded), 1);
}

#[tokio::test]
async fn test_rejections_carry_request_id() {
    let app = TestApp::new();
    let (status, headers, body) = app.send(empty_request(Method::GET, "/me", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let header_id = headers["x-request-id"].to_str().unwrap();
    assert_eq!(body["correlation_id"], header_id);
    assert_eq!(headers["cache-control"], "no-store");
}

#[tokio::test]
async fn test_me_reports_subject() {
    let app = TestApp::new();
    let (access, _) = app.session().await;

    let (status, _, body) = app.send(empty_request(Method::GET, "/me", Some(&access))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], USER);
    assert_eq!(body["role"], "member");
    assert!(body["last_seen"].is_string());
}

#[tokio::test]
async fn test_refresh_rotates_and_rejects_reuse() {
    let app = TestApp::new();
    let (_, refresh) = app.session().await;

    let (status, _, rotated) = app
        .send(json_request(
            Method::POST,
            "/auth/refresh",
            None,
            json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], refresh.as_str());

    let (status, _, _) = app
        .send(json_request(
            Method::POST,
            "/auth/refresh",
            None,
            json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.events.count(SecurityEventType::RefreshReuse), 1);

    let (status, _, _) = app
        .send(json_request(
            Method::POST,
            "/auth/refresh",
            None,
            json!({ "refresh_token": rotated["refresh_token"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_access_credential_cannot_refresh() {
    let app = TestApp::new();
    let (access, _) = app.session().await;

    let (status, _, _) = app
        .send(json_request(
            Method::POST,
            "/auth/refresh",
            None,
            json!({ "refresh_token": access }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_presented_credentials() {
    let app = TestApp::new();
    let (access, refresh) = app.session().await;

    let (status, _, _) = app
        .send(json_request(
            Method::POST,
            "/auth/logout",
            Some(&access),
            json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = app.send(empty_request(Method::GET, "/me", Some(&access))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .send(json_request(
            Method::POST,
            "/auth/refresh",
            None,
            json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.events.count(SecurityEventType::CredentialRevoked), 2);
}

#[tokio::test]
async fn test_logout_all_invalidates_earlier_sessions() {
    let app = TestApp::new();
    let (first, _) = app.session().await;
    let (second, _) = app.session().await;

    app.clock.advance(1);
    let (status, _, _) = app
        .send(empty_request(Method::POST, "/auth/logout-all", Some(&second)))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for token in [&first, &second] {
        let (status, _, _) = app.send(empty_request(Method::GET, "/me", Some(token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    app.clock.advance(1);
    let (fresh, _) = app.session().await;
    let (status, _, _) = app.send(empty_request(Method::GET, "/me", Some(&fresh))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_access_credential_rejected() {
    let app = TestApp::new();
    let (access, _) = app.session().await;

    app.clock.advance(app.config.tokens.access_ttl_secs);
    let (status, _, _) = app.send(empty_request(Method::GET, "/me", Some(&access))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_subject_rejected() {
    let app = TestApp::new();
    let (access, _) = app.session().await;

    app.identity.set_active(USER, false);
    let (status, _, _) = app.send(empty_request(Method::GET, "/me", Some(&access))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_critical_post_rejected_with_400() {
    let app = TestApp::new();
    let (access, _) = app.session().await;

    let (status, _, body) = app
        .send(json_request(
            Method::POST,
            "/posts",
            Some(&access),
            json!({ "title": "x'; DROP TABLE users;" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(app.events.count(SecurityEventType::ThreatDetected), 1);
}

#[tokio::test]
async fn test_post_is_sanitized_before_handler() {
    let app = TestApp::new();
    let (access, _) = app.session().await;

    let (status, _, body) = app
        .send(json_request(
            Method::POST,
            "/posts",
            Some(&access),
            json!({ "title": "it's -- fine", "tags": ["a"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["sanitized"], true);
    assert_eq!(body["author"], USER);
    assert_eq!(body["post"]["title"], "it\\'s  fine");
    assert_eq!(body["post"]["tags"], json!(["a"]));
}

#[tokio::test]
async fn test_clean_post_passes_unchanged() {
    let app = TestApp::new();
    let (access, _) = app.session().await;

    let (status, _, body) = app
        .send(json_request(
            Method::POST,
            "/posts",
            Some(&access),
            json!({ "title": "hello world" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["sanitized"], false);
    assert_eq!(body["post"]["title"], "hello world");
}

#[tokio::test]
async fn test_post_read_allows_anonymous_viewer() {
    let app = TestApp::new();

    let (status, _, body) = app.send(empty_request(Method::GET, "/posts/42", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "42");
    assert!(body["viewer"].is_null());

    let (status, _, _) = app
        .send(empty_request(Method::GET, "/posts/42", Some("not.a.token")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_detect_only_route_logs_and_proceeds() {
    let app = TestApp::new();

    let (status, _, body) = app
        .send(empty_request(Method::GET, "/posts/1%20OR%201%3D1", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "1 OR 1=1");
    assert_eq!(app.events.count(SecurityEventType::ThreatDetected), 1);

    let event = app
        .events
        .events()
        .into_iter()
        .find(|e| e.event_type == SecurityEventType::ThreatDetected)
        .unwrap();
    assert_eq!(event.outcome, "high");
    assert_eq!(event.fields["verdict"], "proceed");
}

#[tokio::test]
async fn test_detect_only_route_still_blocks_critical_path_param() {
    let app = TestApp::new();

    let (status, _, body) = app
        .send(empty_request(
            Method::GET,
            "/posts/1%3B%20DROP%20TABLE%20posts",
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(app.events.count(SecurityEventType::ThreatDetected), 1);
}

#[tokio::test]
async fn test_health_is_unguarded() {
    let app = TestApp::new();
    for _ in 0..10 {
        let (status, _, body) = app.send(empty_request(Method::GET, "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
