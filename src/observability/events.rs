//! Security event sink.
//!
//! Components report security-relevant outcomes as structured
//! [`SecurityEvent`]s. The core only appends; nothing reads events back.

use serde::Serialize;
use serde_json::{Map, Value};

/// Kind of security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    AuthenticationFailed,
    CredentialRevoked,
    CredentialsInvalidated,
    RefreshReuse,
    RateLimitExceeded,
    ThreatDetected,
    /// A dependency was unavailable and a fail-open/closed policy applied.
    Degraded,
    InternalError,
}

impl SecurityEventType {
    /// Level on the `security` target. Degraded events stay at `warn`;
    /// the component reporting them escalates its own log when a failure
    /// streak crosses its alarm threshold.
    pub fn level(&self) -> tracing::Level {
        match self {
            SecurityEventType::InternalError => tracing::Level::ERROR,
            _ => tracing::Level::WARN,
        }
    }
}

/// One structured security log record.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    /// Subject id, or `None` for anonymous requests.
    pub subject: Option<String>,
    pub origin: Option<String>,
    /// Severity or outcome label, e.g. `critical`, `blocked`, `fail_open`.
    pub outcome: String,
    pub correlation_id: Option<String>,
    pub fields: Map<String, Value>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, outcome: impl Into<String>) -> Self {
        Self {
            event_type,
            subject: None,
            origin: None,
            outcome: outcome.into(),
            correlation_id: None,
            fields: Map::new(),
        }
    }

    pub fn subject(mut self, subject: Option<&str>) -> Self {
        self.subject = subject.map(str::to_string);
        self
    }

    pub fn origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(str::to_string);
        self
    }

    pub fn correlation_id(mut self, id: Option<&str>) -> Self {
        self.correlation_id = id.map(str::to_string);
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Append-only consumer of security events.
pub trait SecurityEventSink: Send + Sync {
    fn emit(&self, event: SecurityEvent);
}

/// Emits events as `tracing` records on the `security` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl SecurityEventSink for TracingEventSink {
    fn emit(&self, event: SecurityEvent) {
        let fields = Value::Object(event.fields);
        let subject = event.subject.as_deref().unwrap_or("anonymous");
        let origin = event.origin.as_deref().unwrap_or("unknown");
        let correlation_id = event.correlation_id.as_deref().unwrap_or("-");

        if event.event_type.level() == tracing::Level::ERROR {
            tracing::error!(
                target: "security",
                event_type = ?event.event_type,
                subject,
                origin,
                outcome = %event.outcome,
                correlation_id,
                fields = %fields,
                "security event"
            );
        } else {
            tracing::warn!(
                target: "security",
                event_type = ?event.event_type,
                subject,
                origin,
                outcome = %event.outcome,
                correlation_id,
                fields = %fields,
                "security event"
            );
        }
    }
}
