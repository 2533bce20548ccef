//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (assign x-request-id)
//!     → server.rs (Axum router, trace/timeout layers)
//!     → pipeline::security_middleware (per-route checks)
//!     → handlers (login, refresh, logout, me, posts)
//!     → response (x-request-id echoed)
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{build_router, AppState, HttpServer};
