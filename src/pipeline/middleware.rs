//! Axum middleware running the security pipeline for one route.
//!
//! # Responsibilities
//! - Build an `InboundRequest` from the HTTP request (credential, origin,
//!   query, path params, headers, buffered body)
//! - Run the route's checks and turn a `Rejection` into a response
//! - Forward the sanitized body and query when the threat check rewrote them
//! - Attach `SecurityContext` to the request for handlers

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{ConnectInfo, RawPathParams, Request, State};
use axum::http::header::{CONTENT_LENGTH, USER_AGENT};
use axum::http::request::Parts;
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::RequestPartsExt;
use uuid::Uuid;

use crate::auth::{extract_credential, extract_origin};
use crate::config::ShieldConfig;
use crate::http::X_REQUEST_ID;
use crate::pipeline::{InboundRequest, Rejection, SecurityPipeline};
use crate::threat::{RequestBody, RequestInput};

/// Request handling settings the middleware needs from configuration.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub cookie_name: String,
    pub trust_forwarded_for: bool,
    pub max_body_bytes: usize,
}

impl RequestSettings {
    pub fn from_config(config: &ShieldConfig) -> Self {
        Self {
            cookie_name: config.tokens.cookie_name.clone(),
            trust_forwarded_for: config.server.trust_forwarded_for,
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

/// Middleware state: which route's checks to run.
#[derive(Clone)]
pub struct RouteGuard {
    pub pipeline: Arc<SecurityPipeline>,
    pub settings: Arc<RequestSettings>,
    pub route: &'static str,
}

impl RouteGuard {
    pub fn new(
        pipeline: Arc<SecurityPipeline>,
        settings: Arc<RequestSettings>,
        route: &'static str,
    ) -> Self {
        Self {
            pipeline,
            settings,
            route,
        }
    }
}

/// Inputs after the threat check rewrote them.
#[derive(Debug, Clone)]
pub struct SanitizedInput(pub RequestInput);

pub async fn security_middleware(
    State(guard): State<RouteGuard>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let correlation_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let bytes = match to_bytes(body, guard.settings.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(correlation_id = %correlation_id, error = %e, "Failed to buffer request body");
            return Rejection::threat(&correlation_id, format!("unreadable body: {e}"))
                .into_response();
        }
    };

    let mut inbound = inbound_request(&mut parts, &bytes, &guard.settings, correlation_id).await;

    let context = match guard.pipeline.run(guard.route, &mut inbound).await {
        Ok(context) => context,
        Err(rejection) => return rejection.into_response(),
    };

    let body = if context.sanitized {
        rewrite_query(&mut parts.uri, &inbound.input.query);
        parts.headers.remove(CONTENT_LENGTH);
        let body = match &inbound.input.body {
            RequestBody::Empty => Body::empty(),
            RequestBody::Json(value) => Body::from(serde_json::to_vec(value).unwrap_or_default()),
            RequestBody::Text(text) => Body::from(text.clone()),
        };
        parts.extensions.insert(SanitizedInput(inbound.input));
        body
    } else {
        Body::from(bytes)
    };

    parts.extensions.insert(context);
    next.run(Request::from_parts(parts, body)).await
}

async fn inbound_request(
    parts: &mut Parts,
    bytes: &Bytes,
    settings: &RequestSettings,
    correlation_id: String,
) -> InboundRequest {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let params = match parts.extract::<RawPathParams>().await {
        Ok(params) => params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        Err(_) => Vec::new(),
    };

    let query = parts
        .uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = if bytes.is_empty() {
        RequestBody::Empty
    } else {
        match serde_json::from_slice(bytes) {
            Ok(value) => RequestBody::Json(value),
            Err(_) => RequestBody::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    };

    InboundRequest {
        path: parts.uri.path().to_string(),
        origin: extract_origin(&parts.headers, peer, settings.trust_forwarded_for),
        user_agent: parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        credential: extract_credential(&parts.headers, &settings.cookie_name),
        correlation_id,
        input: RequestInput {
            query,
            params,
            headers,
            body,
        },
    }
}

fn rewrite_query(uri: &mut Uri, query: &[(String, String)]) {
    if uri.query().is_none() {
        return;
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query)
        .finish();
    let path_and_query = if encoded.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{encoded}", uri.path())
    };

    let mut uri_parts = uri.clone().into_parts();
    match path_and_query.parse() {
        Ok(pq) => {
            uri_parts.path_and_query = Some(pq);
            if let Ok(rewritten) = Uri::from_parts(uri_parts) {
                *uri = rewritten;
            }
        }
        Err(e) => tracing::warn!(error = %e, "Could not rewrite sanitized query string"),
    }
}
