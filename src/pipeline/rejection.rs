//! Terminal pipeline results and their outward HTTP form.
//!
//! Client-facing bodies are generic; the specific reason only goes to logs.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::rate_limit::RateLimitDecision;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Outward category of a terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Authentication,
    RateLimited(RateLimitDecision),
    Threat,
    Internal,
}

impl RejectionKind {
    pub fn status(&self) -> StatusCode {
        match self {
            RejectionKind::Authentication => StatusCode::UNAUTHORIZED,
            RejectionKind::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            RejectionKind::Threat => StatusCode::BAD_REQUEST,
            RejectionKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RejectionKind::Authentication => "unauthorized",
            RejectionKind::RateLimited(_) => "rate_limited",
            RejectionKind::Threat => "invalid_input",
            RejectionKind::Internal => "internal_error",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            RejectionKind::Authentication => "Authentication required",
            RejectionKind::RateLimited(_) => "Too many requests",
            RejectionKind::Threat => "Invalid input",
            RejectionKind::Internal => "Internal server error",
        }
    }
}

/// A terminal result carrying the correlation id of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub correlation_id: String,
    /// Internal reason, logged but never sent to the client.
    pub reason: String,
}

impl Rejection {
    pub fn new(kind: RejectionKind, correlation_id: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            correlation_id: correlation_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn authentication(correlation_id: &str, reason: impl Into<String>) -> Self {
        Self::new(RejectionKind::Authentication, correlation_id, reason)
    }

    pub fn threat(correlation_id: &str, reason: impl Into<String>) -> Self {
        Self::new(RejectionKind::Threat, correlation_id, reason)
    }

    pub fn internal(correlation_id: &str, reason: impl Into<String>) -> Self {
        Self::new(RejectionKind::Internal, correlation_id, reason)
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

#[derive(Serialize)]
struct RateLimitBody {
    limit: u64,
    remaining: u64,
    reset_at: u64,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: &'static str,
    correlation_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limit: Option<RateLimitBody>,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let rate_limit = match self.kind {
            RejectionKind::RateLimited(decision) => Some(decision),
            _ => None,
        };

        let body = ErrorBody {
            error: self.kind.code(),
            message: self.kind.message(),
            correlation_id: &self.correlation_id,
            rate_limit: rate_limit.map(|d| RateLimitBody {
                limit: d.limit,
                remaining: d.remaining,
                reset_at: d.reset_at,
            }),
        };
        let mut response = (self.kind.status(), Json(body)).into_response();

        if let Some(decision) = rate_limit {
            let headers = response.headers_mut();
            headers.insert(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from(decision.retry_after),
            );
            headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
            headers.insert(RATE_LIMIT_RESET, HeaderValue::from(decision.reset_at));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(Rejection::authentication("c", "expired").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Rejection::threat("c", "critical").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Rejection::internal("c", "panic").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_headers() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 5,
            current: 6,
            remaining: 0,
            reset_at: 1_900,
            retry_after: 900,
            degraded: false,
        };
        let response =
            Rejection::new(RejectionKind::RateLimited(decision), "c", "login").into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "900");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()["x-ratelimit-reset"], "1900");
    }
}
