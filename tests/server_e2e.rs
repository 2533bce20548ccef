//! Tests against a bound listener: client IPs, hot reload and shutdown.

use std::time::Duration;

use serde_json::{json, Value};

use request_shield::lifecycle::Shutdown;
use request_shield::rate_limit::RateLimitPolicy;
use request_shield::testutil::test_config;

mod common;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_login_over_socket() {
    let shutdown = Shutdown::new();
    let (addr, _config_tx) = common::spawn_server(test_config(), &shutdown).await;
    let client = client();

    let res = client
        .post(format!("http://{addr}/auth/login"))
        .json(&json!({ "username": common::USER, "password": common::PASSWORD }))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    let tokens: Value = res.json().await.unwrap();
    let access = tokens["access_token"].as_str().unwrap();

    let res = client
        .get(format!("http://{addr}/me"))
        .bearer_auth(access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["subject"], common::USER);

    shutdown.trigger();
}

#[tokio::test]
async fn test_cookie_credential_accepted() {
    let shutdown = Shutdown::new();
    let config = test_config();
    let cookie_name = config.tokens.cookie_name.clone();
    let (addr, _config_tx) = common::spawn_server(config, &shutdown).await;
    let client = client();

    let tokens: Value = client
        .post(format!("http://{addr}/auth/login"))
        .json(&json!({ "username": common::USER, "password": common::PASSWORD }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let access = tokens["access_token"].as_str().unwrap();

    let res = client
        .get(format!("http://{addr}/me"))
        .header("cookie", format!("{cookie_name}={access}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // The header wins over the cookie.
    let res = client
        .get(format!("http://{addr}/me"))
        .header("cookie", format!("{cookie_name}={access}"))
        .bearer_auth("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    shutdown.trigger();
}

#[tokio::test]
async fn test_reload_tightens_login_limit() {
    let shutdown = Shutdown::new();
    let mut config = test_config();
    let (addr, config_tx) = common::spawn_server(config.clone(), &shutdown).await;
    let client = client();
    let login = || {
        client
            .post(format!("http://{addr}/auth/login"))
            .json(&json!({ "username": common::USER, "password": "wrongpass" }))
            .send()
    };

    assert_eq!(login().await.unwrap().status(), 401);

    config.rate_limit.policies.insert(
        "login".to_string(),
        RateLimitPolicy {
            limit: 1,
            window_secs: 60,
        },
    );
    config_tx.send(config).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The counter survives the reload; the second attempt exceeds the new limit.
    let res = login().await.unwrap();
    assert_eq!(res.status(), 429);
    assert!(res.headers().contains_key("retry-after"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let shutdown = Shutdown::new();
    let (addr, _config_tx) = common::spawn_server(test_config(), &shutdown).await;
    let client = client();

    let res = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let res = client.get(format!("http://{addr}/health")).send().await;
    assert!(res.is_err(), "server still serving after shutdown");
}
