//! Request identification.
//!
//! # Responsibilities
//! - Assign every request a UUID v4 in `x-request-id` unless the client sent one
//! - Echo the id on the response so clients can quote it
//! - The security pipeline uses the same id as its correlation id
//!
//! # Design Decisions
//! - Request ID added as early as possible (outermost layer) for tracing
//! - A client-supplied id is kept as-is; it is only used for log correlation

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Header carrying the request (correlation) id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer assigning a request id.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer copying the request id onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
