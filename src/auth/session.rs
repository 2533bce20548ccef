//! Session activity record.
//!
//! After a successful authentication the subject's last-seen time, origin
//! and agent are written to the shared cache with the inactivity window as
//! TTL. The record is informational: it never gates authorization, and a
//! failed write is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::SharedCache;
use crate::clock::Clock;
use crate::observability::metrics;

const SESSION_PREFIX: &str = "session:";

/// Last observed activity for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionActivity {
    pub last_seen: DateTime<Utc>,
    pub origin: Option<String>,
    pub agent: Option<String>,
}

/// Writes and reads session activity records.
#[derive(Clone)]
pub struct SessionTracker {
    cache: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
    inactivity: Duration,
}

impl SessionTracker {
    pub fn new(cache: Arc<dyn SharedCache>, clock: Arc<dyn Clock>, inactivity: Duration) -> Self {
        Self {
            cache,
            clock,
            inactivity,
        }
    }

    fn key(subject: &str) -> String {
        format!("{SESSION_PREFIX}{subject}")
    }

    /// Record activity for `subject`, extending the inactivity window.
    pub async fn touch(&self, subject: &str, origin: Option<&str>, agent: Option<&str>) {
        let last_seen = DateTime::from_timestamp(self.clock.now_unix() as i64, 0)
            .unwrap_or_else(Utc::now);
        let activity = SessionActivity {
            last_seen,
            origin: origin.map(str::to_string),
            agent: agent.map(str::to_string),
        };

        let value = match serde_json::to_string(&activity) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "Failed to encode session activity");
                return;
            }
        };

        if let Err(e) = self
            .cache
            .set(&Self::key(subject), &value, Some(self.inactivity))
            .await
        {
            tracing::warn!(
                component = "session",
                subject = %subject,
                error = %e,
                "Failed to record session activity"
            );
            metrics::record_degraded("session");
        }
    }

    /// Most recent activity, or `None` when absent, expired or unreadable.
    pub async fn last_seen(&self, subject: &str) -> Option<SessionActivity> {
        match self.cache.get(&Self::key(subject)).await {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .inspect_err(|e| {
                    tracing::debug!(subject = %subject, error = %e, "Discarding unreadable session record")
                })
                .ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(component = "session", subject = %subject, error = %e, "Failed to read session activity");
                None
            }
        }
    }
}
