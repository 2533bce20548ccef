//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline checks, token manager, rate limiter
//!     → events.rs   SecurityEvent {type, subject, origin, outcome, correlation_id}
//!     → metrics.rs  rejection / degraded / finding counters
//!     → logging.rs  tracing subscriber (pretty or JSON on stdout)
//! ```
//!
//! # Design Decisions
//! - Security events go through a sink trait so tests can record them
//! - The production sink writes events as `tracing` records, one level per type
//! - Metrics recording is a no-op until an exporter is installed

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{SecurityEvent, SecurityEventSink, SecurityEventType, TracingEventSink};
