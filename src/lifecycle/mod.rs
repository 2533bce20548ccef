//! Process lifecycle: building the security core and stopping cleanly.
//!
//! # Data Flow
//! ```text
//! main: ShieldConfig (validated)
//!     → startup.rs: cache → tokens → rate limiter → detector → pipeline
//!     → http::HttpServer::run
//!
//! SIGTERM / Ctrl-C (signals.rs)
//!     → Shutdown::trigger (shutdown.rs)
//!     → listener stops accepting, in-flight requests finish
//! ```
//!
//! # Design Decisions
//! - Construction errors are fatal; nothing is retried at startup
//! - Config reload is file-driven (see `config::watcher`), not signal-driven

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Components, StartupError};
