//! Credential and origin extraction from request headers.

use std::net::SocketAddr;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;

const BEARER: &str = "bearer ";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Presented access credential. `Authorization: Bearer` wins over the cookie.
pub fn extract_credential(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_value(headers, cookie_name))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    if value.len() <= BEARER.len() || !value[..BEARER.len()].eq_ignore_ascii_case(BEARER) {
        return None;
    }
    let token = value[BEARER.len()..].trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Network origin of the request.
///
/// The left-most `X-Forwarded-For` entry is only used when the deployment
/// sits behind a proxy that overwrites it; otherwise the peer address.
pub fn extract_origin(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<String> {
    if trust_forwarded_for {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(origin) = forwarded {
            return Some(origin.to_string());
        }
    }
    peer.map(|addr| addr.ip().to_string())
}
