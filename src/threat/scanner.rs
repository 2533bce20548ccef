//! Recursive scan of request inputs down to their string leaves.

use serde::Serialize;
use serde_json::Value;

use crate::threat::signatures::{Category, SignatureMatch, SignatureSet};
use crate::threat::Severity;

/// Result of scanning one string leaf (or object key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Location within the request, e.g. `body.items[2].name`.
    pub path: String,
    pub severity: Severity,
    pub categories: Vec<Category>,
    /// Matched substrings, truncated for logging.
    pub matched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("nesting deeper than {max_depth} at '{path}'")]
    TooDeep { path: String, max_depth: usize },
}

pub(crate) fn child_key(parent: &str, key: &str) -> String {
    format!("{parent}.{key}")
}

pub(crate) fn child_index(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

/// Walks values and collects findings.
pub(crate) struct Scanner<'a> {
    pub signatures: &'a SignatureSet,
    pub max_depth: usize,
    pub max_match_len: usize,
    pub findings: Vec<Finding>,
}

impl<'a> Scanner<'a> {
    pub fn new(signatures: &'a SignatureSet, max_depth: usize, max_match_len: usize) -> Self {
        Self {
            signatures,
            max_depth,
            max_match_len,
            findings: Vec::new(),
        }
    }

    pub fn scan_text(&mut self, path: String, text: &str) {
        let matches = self.signatures.matches(text);
        self.record(path, matches);
    }

    fn scan_key(&mut self, path: String, key: &str) {
        if let Some(m) = self.signatures.key_matches(key) {
            self.record(path, vec![m]);
        }
    }

    pub fn scan_value(&mut self, path: String, value: &Value, depth: usize) -> Result<(), ScanError> {
        if depth > self.max_depth {
            return Err(ScanError::TooDeep {
                path,
                max_depth: self.max_depth,
            });
        }

        match value {
            Value::String(text) => self.scan_text(path, text),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.scan_value(child_index(&path, i), item, depth + 1)?;
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let child = child_key(&path, key);
                    self.scan_key(child.clone(), key);
                    self.scan_value(child, item, depth + 1)?;
                }
            }
            // Numbers, booleans and null carry no text.
            Value::Number(_) | Value::Bool(_) | Value::Null => {}
        }
        Ok(())
    }

    fn record(&mut self, path: String, matches: Vec<SignatureMatch>) {
        if matches.is_empty() {
            return;
        }
        let severity = matches
            .iter()
            .map(|m| m.category.severity())
            .max()
            .unwrap_or_default();
        let max_len = self.max_match_len;
        self.findings.push(Finding {
            path,
            severity,
            categories: matches.iter().map(|m| m.category).collect(),
            matched: matches
                .into_iter()
                .map(|m| m.matched.chars().take(max_len).collect())
                .collect(),
        });
    }
}
