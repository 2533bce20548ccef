//! Request-security pipeline library.
//!
//! Credential lifecycle, fixed-window rate limiting and injection detection,
//! composed per route into an ordered check sequence in front of Axum
//! handlers.

// Security core
pub mod auth;
pub mod pipeline;
pub mod rate_limit;
pub mod threat;

// Shared contracts
pub mod cache;
pub mod clock;

// Surface and cross-cutting concerns
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::schema::ShieldConfig;
pub use http::HttpServer;
pub use lifecycle::{Components, Shutdown};
pub use pipeline::SecurityPipeline;
