//! Threat detection subsystem.
//!
//! # Data Flow
//! ```text
//! RequestInput { query, params, allow-listed headers, body }
//!     → scanner.rs (recursive walk, string leaves and object keys)
//!     → signatures.rs (ten categories, severity floors)
//!     → Finding set, request severity = max over findings
//!     → policy.rs (detect-only / sanitize / block, severity ceiling)
//!     → sanitize.rs (flagged leaves only, sanitize mode only)
//! ```
//!
//! # Design Decisions
//! - Critical findings reject regardless of mode or ceiling
//! - Scanner failures (depth limit, panics) are logged and treated as clean
//! - Patterns are compiled once when the detector is built
//! - Header values are scanned but never rewritten

pub mod policy;
pub mod sanitize;
pub mod scanner;
pub mod signatures;

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;

use crate::config::ThreatConfig;
use crate::observability::metrics;

pub use policy::{ThreatMode, ThreatPolicy, Verdict};
pub use sanitize::Sanitizer;
pub use scanner::{Finding, ScanError};
pub use signatures::{Category, Severity, SignatureSet};

use scanner::{child_index, child_key, Scanner};

/// Request body as seen by the detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// Non-JSON payload, scanned as a single leaf named `body`.
    Text(String),
}

/// The untrusted parts of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInput {
    pub query: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    /// Lowercase header names with their values.
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

/// What the detector decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatOutcome {
    pub verdict: Verdict,
    pub severity: Severity,
    pub findings: Vec<Finding>,
    /// Inputs were rewritten in place.
    pub sanitized: bool,
}

/// Scans requests and applies threat policies.
#[derive(Debug, Clone)]
pub struct ThreatDetector {
    signatures: SignatureSet,
    sanitizer: Sanitizer,
    header_allow_list: Vec<String>,
    max_depth: usize,
    max_match_len: usize,
}

impl ThreatDetector {
    pub fn new(config: &ThreatConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            signatures: SignatureSet::new()?,
            sanitizer: Sanitizer::new()?,
            header_allow_list: config
                .header_allow_list
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            max_depth: config.max_depth,
            max_match_len: config.max_match_len,
        })
    }

    /// Collect findings from every scanned part of `input`.
    pub fn scan(&self, input: &RequestInput) -> Result<Vec<Finding>, ScanError> {
        let mut scanner = Scanner::new(&self.signatures, self.max_depth, self.max_match_len);

        for (key, value) in &input.query {
            scanner.scan_text(child_key("query", key), value);
        }
        for (key, value) in &input.params {
            scanner.scan_text(child_key("params", key), value);
        }
        for (name, value) in &input.headers {
            if self.header_allow_list.iter().any(|h| h == name) {
                scanner.scan_text(child_key("headers", name), value);
            }
        }
        match &input.body {
            RequestBody::Empty => {}
            RequestBody::Json(value) => scanner.scan_value("body".to_string(), value, 0)?,
            RequestBody::Text(text) => scanner.scan_text("body".to_string(), text),
        }

        Ok(scanner.findings)
    }

    /// Scan `input`, apply `policy`, and sanitize in place when it says so.
    pub fn inspect(&self, input: &mut RequestInput, policy: &ThreatPolicy) -> ThreatOutcome {
        let findings = match catch_unwind(AssertUnwindSafe(|| self.scan(input))) {
            Ok(Ok(findings)) => findings,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Threat scan failed, treating input as clean");
                metrics::record_degraded("threat");
                Vec::new()
            }
            Err(_) => {
                tracing::error!("Threat scan panicked, treating input as clean");
                metrics::record_degraded("threat");
                Vec::new()
            }
        };

        let severity = findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or_default();
        for finding in &findings {
            metrics::record_finding(finding.severity.as_str());
        }

        let verdict = policy.decide(severity);
        let sanitized = verdict == Verdict::Sanitize && self.sanitize(input, &findings);

        ThreatOutcome {
            verdict,
            severity,
            findings,
            sanitized,
        }
    }

    /// Rewrite every flagged leaf. Returns whether anything changed.
    fn sanitize(&self, input: &mut RequestInput, findings: &[Finding]) -> bool {
        let flagged: HashSet<&str> = findings.iter().map(|f| f.path.as_str()).collect();
        let mut changed = false;

        for (prefix, pairs) in [("query", &mut input.query), ("params", &mut input.params)] {
            for (key, value) in pairs.iter_mut() {
                if flagged.contains(child_key(prefix, key).as_str()) {
                    changed |= self.rewrite(value);
                }
            }
        }

        match &mut input.body {
            RequestBody::Empty => {}
            RequestBody::Json(value) => {
                changed |= self.sanitize_value("body".to_string(), value, &flagged);
            }
            RequestBody::Text(text) => {
                if flagged.contains("body") {
                    changed |= self.rewrite(text);
                }
            }
        }
        changed
    }

    fn sanitize_value(&self, path: String, value: &mut Value, flagged: &HashSet<&str>) -> bool {
        match value {
            Value::String(text) if flagged.contains(path.as_str()) => self.rewrite(text),
            Value::Array(items) => items
                .iter_mut()
                .enumerate()
                .fold(false, |changed, (i, item)| {
                    self.sanitize_value(child_index(&path, i), item, flagged) | changed
                }),
            Value::Object(map) => map.iter_mut().fold(false, |changed, (key, item)| {
                self.sanitize_value(child_key(&path, key), item, flagged) | changed
            }),
            _ => false,
        }
    }

    fn rewrite(&self, text: &mut String) -> bool {
        let clean = self.sanitizer.sanitize(text);
        if clean == *text {
            return false;
        }
        *text = clean;
        true
    }
}
