//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the bundled handlers
//! - Attach the security pipeline to each route through `route_layer`
//! - Wire up middleware (tracing, timeout, request ID, response headers)
//! - Apply reloaded policies while serving
//! - Serve until the shutdown signal, then drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{extract_credential, CredentialPair, MemoryIdentityStore, TokenError, TokenManager};
use crate::config::ShieldConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Components;
use crate::pipeline::middleware::{RequestSettings, SanitizedInput};
use crate::pipeline::{security_middleware, Rejection, RouteGuard, SecurityContext, SecurityPipeline};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SecurityPipeline>,
    pub tokens: Arc<TokenManager>,
    pub identity: Arc<MemoryIdentityStore>,
    pub settings: Arc<RequestSettings>,
}

impl From<&Components> for AppState {
    fn from(components: &Components) -> Self {
        Self {
            pipeline: components.pipeline.clone(),
            tokens: components.tokens.clone(),
            identity: components.identity.clone(),
            settings: components.settings.clone(),
        }
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &ShieldConfig, components: &Components) -> Router {
    let state = AppState::from(components);
    let pipeline = state.pipeline.clone();
    let settings = state.settings.clone();
    let guard = |route: &'static str, method: MethodRouter<AppState>| {
        method.route_layer(from_fn_with_state(
            RouteGuard::new(pipeline.clone(), settings.clone(), route),
            security_middleware,
        ))
    };

    Router::new()
        .route("/health", get(health))
        .route("/auth/login", guard("login", post(login)))
        .route("/auth/refresh", guard("refresh", post(refresh)))
        .route("/auth/logout", guard("logout", post(logout)))
        .route("/auth/logout-all", guard("logout-all", post(logout_all)))
        .route("/me", guard("me", get(me)))
        .route("/posts", guard("post-create", post(create_post)))
        .route("/posts/{id}", guard("post-read", get(read_post)))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
}

/// HTTP server for the security pipeline.
pub struct HttpServer {
    router: Router,
    config: ShieldConfig,
    pipeline: Arc<SecurityPipeline>,
}

impl HttpServer {
    pub fn new(config: ShieldConfig, components: Components) -> Self {
        let router = build_router(&config, &components);
        Self {
            router,
            config,
            pipeline: components.pipeline,
        }
    }

    /// Serve on `listener` until `shutdown` fires, applying configuration
    /// updates as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ShieldConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let pipeline = self.pipeline.clone();
        let mut current = self.config.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                let ignored = restart_required(&current, &new_config);
                if !ignored.is_empty() {
                    tracing::warn!(
                        sections = ?ignored,
                        "Settings changed that only apply after a restart"
                    );
                }
                pipeline.apply_config(&new_config);
                current = new_config;
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }
}

/// Changed settings that are fixed at startup and ignored by a reload.
///
/// Routes, rate-limit policies, skip rules and threat policies hot-swap;
/// everything listed here is baked into components when they are built.
pub fn restart_required(current: &ShieldConfig, new: &ShieldConfig) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if new.server != current.server {
        changed.push("server");
    }
    if new.observability != current.observability {
        changed.push("observability");
    }
    if new.cache != current.cache {
        changed.push("cache");
    }
    if new.tokens != current.tokens {
        changed.push("tokens");
    }
    if new.session != current.session {
        changed.push("session");
    }
    if new.rate_limit.alarm_threshold != current.rate_limit.alarm_threshold {
        changed.push("rate_limit.alarm_threshold");
    }
    if new.threat.header_allow_list != current.threat.header_allow_list {
        changed.push("threat.header_allow_list");
    }
    if new.threat.max_depth != current.threat.max_depth {
        changed.push("threat.max_depth");
    }
    if new.threat.max_match_len != current.threat.max_match_len {
        changed.push("threat.max_match_len");
    }
    changed
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct LogoutRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: u64,
}

impl From<CredentialPair> for TokenResponse {
    fn from(pair: CredentialPair) -> Self {
        Self {
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
            token_type: "Bearer",
            expires_in: pair.access.expires_in,
        }
    }
}

fn token_rejection(e: &TokenError, correlation_id: &str) -> Rejection {
    if e.is_credential_failure() {
        Rejection::authentication(correlation_id, e.to_string())
    } else {
        tracing::error!(error = %e, correlation_id = %correlation_id, "Credential operation failed");
        Rejection::internal(correlation_id, e.to_string())
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn login(
    State(state): State<AppState>,
    Extension(context): Extension<SecurityContext>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let cid = &context.correlation_id;
    if !state.identity.check_password(&request.username, &request.password) {
        tracing::info!(correlation_id = %cid, "Login failed");
        return Rejection::authentication(cid, "bad username or password").into_response();
    }

    match state.tokens.start_session(&request.username).await {
        Ok(pair) => Json(TokenResponse::from(pair)).into_response(),
        Err(e) => token_rejection(&e, cid).into_response(),
    }
}

async fn refresh(
    State(state): State<AppState>,
    Extension(context): Extension<SecurityContext>,
    Json(request): Json<RefreshRequest>,
) -> Response {
    match state.tokens.rotate(&request.refresh_token).await {
        Ok(pair) => Json(TokenResponse::from(pair)).into_response(),
        Err(e) => token_rejection(&e, &context.correlation_id).into_response(),
    }
}

async fn logout(
    State(state): State<AppState>,
    Extension(context): Extension<SecurityContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let cid = &context.correlation_id;
    let request: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return Rejection::threat(cid, format!("bad logout body: {e}")).into_response()
            }
        }
    };

    let presented = extract_credential(&headers, &state.settings.cookie_name);
    for token in presented.iter().chain(request.refresh_token.iter()) {
        if let Err(e) = state.tokens.revoke(token).await {
            return token_rejection(&e, cid).into_response();
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn logout_all(
    State(state): State<AppState>,
    Extension(context): Extension<SecurityContext>,
) -> Response {
    let cid = &context.correlation_id;
    let Some(subject) = context.subject.as_deref() else {
        return Rejection::authentication(cid, "no subject").into_response();
    };
    match state.tokens.revoke_all(subject).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => token_rejection(&e, cid).into_response(),
    }
}

async fn me(
    State(state): State<AppState>,
    Extension(context): Extension<SecurityContext>,
) -> Response {
    let Some(subject) = context.subject.as_deref() else {
        return Rejection::authentication(&context.correlation_id, "no subject").into_response();
    };
    let activity = state.pipeline.sessions().last_seen(subject).await;
    Json(json!({
        "subject": subject,
        "role": context.role,
        "last_seen": activity.map(|a| a.last_seen),
    }))
    .into_response()
}

async fn create_post(
    Extension(context): Extension<SecurityContext>,
    Json(post): Json<Value>,
) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({
            "author": context.subject,
            "post": post,
            "sanitized": context.sanitized,
        })),
    )
        .into_response()
}

async fn read_post(
    Path(id): Path<String>,
    Extension(context): Extension<SecurityContext>,
    sanitized: Option<Extension<SanitizedInput>>,
) -> Response {
    let id = sanitized
        .and_then(|Extension(SanitizedInput(input))| {
            input
                .params
                .into_iter()
                .find_map(|(k, v)| (k == "id").then_some(v))
        })
        .unwrap_or(id);
    Json(json!({ "id": id, "viewer": context.subject })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitPolicy;
    use crate::testutil::test_config;

    #[test]
    fn test_policy_changes_need_no_restart() {
        let current = test_config();
        let mut new = current.clone();
        new.rate_limit.policies.insert(
            "login".into(),
            RateLimitPolicy {
                limit: 1,
                window_secs: 60,
            },
        );
        new.rate_limit.skip_paths.push("/ready".into());
        assert!(restart_required(&current, &new).is_empty());
    }

    #[test]
    fn test_startup_settings_reported() {
        let current = test_config();
        let mut new = current.clone();
        new.session.inactivity_secs += 1;
        new.rate_limit.alarm_threshold += 1;
        new.threat.header_allow_list.push("x-custom".into());
        new.threat.max_depth += 1;
        new.tokens.access_ttl_secs += 1;

        assert_eq!(
            restart_required(&current, &new),
            vec![
                "tokens",
                "session",
                "rate_limit.alarm_threshold",
                "threat.header_allow_list",
                "threat.max_depth",
            ]
        );
    }
}
