//! Threat policies and the decision they produce.

use serde::{Deserialize, Serialize};

use crate::threat::Severity;

/// What to do with findings at or below the ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatMode {
    /// Log only; the request always proceeds unless a finding is critical.
    DetectOnly,
    /// Neutralise flagged leaves and proceed.
    #[default]
    Sanitize,
    /// Proceed unchanged.
    Block,
}

/// Mode plus the highest tolerated severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreatPolicy {
    pub mode: ThreatMode,
    pub allowed_severity: Severity,
}

/// Outcome of applying a policy to a request's maximum severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Sanitize,
    Reject,
}

impl ThreatPolicy {
    /// Critical findings reject under every mode and ceiling.
    pub fn decide(&self, severity: Severity) -> Verdict {
        if severity == Severity::None {
            return Verdict::Proceed;
        }
        if severity == Severity::Critical {
            return Verdict::Reject;
        }
        match self.mode {
            ThreatMode::DetectOnly => Verdict::Proceed,
            _ if severity > self.allowed_severity => Verdict::Reject,
            ThreatMode::Sanitize => Verdict::Sanitize,
            ThreatMode::Block => Verdict::Proceed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(mode: ThreatMode, allowed_severity: Severity) -> ThreatPolicy {
        ThreatPolicy {
            mode,
            allowed_severity,
        }
    }

    #[test]
    fn test_critical_rejects_everywhere() {
        for mode in [ThreatMode::DetectOnly, ThreatMode::Sanitize, ThreatMode::Block] {
            for ceiling in [Severity::Low, Severity::High, Severity::Critical] {
                assert_eq!(policy(mode, ceiling).decide(Severity::Critical), Verdict::Reject);
            }
        }
    }

    #[test]
    fn test_ceiling() {
        let block = policy(ThreatMode::Block, Severity::Medium);
        assert_eq!(block.decide(Severity::Medium), Verdict::Proceed);
        assert_eq!(block.decide(Severity::High), Verdict::Reject);

        let sanitize = policy(ThreatMode::Sanitize, Severity::Medium);
        assert_eq!(sanitize.decide(Severity::Low), Verdict::Sanitize);
        assert_eq!(sanitize.decide(Severity::High), Verdict::Reject);
    }

    #[test]
    fn test_detect_only_proceeds_below_critical() {
        let observe = policy(ThreatMode::DetectOnly, Severity::None);
        assert_eq!(observe.decide(Severity::High), Verdict::Proceed);
    }

    #[test]
    fn test_clean_always_proceeds() {
        let strict = policy(ThreatMode::Sanitize, Severity::None);
        assert_eq!(strict.decide(Severity::None), Verdict::Proceed);
    }
}
