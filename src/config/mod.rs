//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + SHIELD_*_SECRET env overrides
//!     → loader.rs (parse & deserialize, unknown keys rejected)
//!     → validation.rs (semantic checks, all errors collected)
//!     → ShieldConfig (validated, immutable)
//!     → components constructed once at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → pipeline swaps its policy table atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - Only policies (routes, limits, threat ceilings) hot-reload; secrets do not
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{default_config, load_config, parse_config, ConfigError};
pub use schema::{
    CacheConfig, Environment, LogFormat, ObservabilityConfig, RateLimitConfig, RouteConfig,
    ServerConfig, SessionConfig, ShieldConfig, ThreatConfig, TokenConfig,
};
