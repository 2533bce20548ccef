//! Injection signature categories.
//!
//! Each category is a fixed set of case-insensitive patterns with a severity
//! floor. A string matching several categories takes the highest floor.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Threat severity, ordered from harmless to always-blocking.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named signature category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CommandKeyword,
    CommentDelimiter,
    Tautology,
    EncodedBytes,
    DangerousFunction,
    SchemaIntrospection,
    TimeDelay,
    StackedStatement,
    DocumentOperator,
    MarkupScript,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::CommandKeyword,
        Category::CommentDelimiter,
        Category::Tautology,
        Category::EncodedBytes,
        Category::DangerousFunction,
        Category::SchemaIntrospection,
        Category::TimeDelay,
        Category::StackedStatement,
        Category::DocumentOperator,
        Category::MarkupScript,
    ];

    pub fn severity(&self) -> Severity {
        match self {
            Category::CommandKeyword => Severity::Low,
            Category::CommentDelimiter | Category::EncodedBytes => Severity::Medium,
            Category::Tautology
            | Category::DangerousFunction
            | Category::SchemaIntrospection
            | Category::TimeDelay
            | Category::DocumentOperator
            | Category::MarkupScript => Severity::High,
            Category::StackedStatement => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CommandKeyword => "command_keyword",
            Category::CommentDelimiter => "comment_delimiter",
            Category::Tautology => "tautology",
            Category::EncodedBytes => "encoded_bytes",
            Category::DangerousFunction => "dangerous_function",
            Category::SchemaIntrospection => "schema_introspection",
            Category::TimeDelay => "time_delay",
            Category::StackedStatement => "stacked_statement",
            Category::DocumentOperator => "document_operator",
            Category::MarkupScript => "markup_script",
        }
    }

    fn patterns(&self) -> &'static [&'static str] {
        match self {
            Category::CommandKeyword => &[
                r"\b(select|insert|update|delete|drop|union|alter|create|truncate|exec|execute|declare|merge|grant|revoke)\b",
            ],
            Category::CommentDelimiter => &[r"--", r"/\*", r"\*/"],
            Category::Tautology => &[
                r"\b(or|and)\s+(\d+)\s*=\s*(\d+)",
                r"'\s*(or|and)\s*'",
                r"\b(or|and)\s+'[^']*'\s*=\s*'",
                r"\bor\s+true\b",
                r"'\s*=\s*'",
            ],
            Category::EncodedBytes => &[
                r"%27|%22|%3b|%00|%25(27|22|3b)",
                r"0x2[27]|\\x2[27]",
                r"&#(39|34|x27|x22);",
            ],
            Category::DangerousFunction => &[
                r"\b(load_file|xp_cmdshell|sp_executesql|exec|char|nchar|group_concat|concat)\s*\(",
                r"\binto\s+(out|dump)file\b",
                r"\bunion\s+(all\s+)?select\b",
            ],
            Category::SchemaIntrospection => &[
                r"\b(information_schema|pg_catalog|pg_tables|sqlite_master|sysobjects|syscolumns|mysql\.user)\b",
            ],
            Category::TimeDelay => &[
                r"\b(sleep|benchmark|pg_sleep)\s*\(",
                r"\bwaitfor\s+delay\b",
            ],
            Category::StackedStatement => &[
                r";\s*(drop|delete|insert|update|alter|create|truncate|exec|shutdown)\b",
            ],
            Category::DocumentOperator => &[
                r"\$(where|ne|eq|gt|gte|lt|lte|in|nin|regex|exists|expr|or|and|not|nor|function)\b",
            ],
            Category::MarkupScript => &[
                r"<\s*script",
                r"<\s*iframe",
                r"\b(javascript|vbscript)\s*:",
                r"data:text/html",
                r"<[^>]*\bon[a-z]+\s*=",
            ],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One category hit and the substring that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    pub category: Category,
    pub matched: String,
}

/// All categories with their patterns compiled.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    compiled: Vec<(Category, Vec<Regex>)>,
}

impl SignatureSet {
    pub fn new() -> Result<Self, regex::Error> {
        let compiled = Category::ALL
            .iter()
            .map(|category| {
                let regexes = category
                    .patterns()
                    .iter()
                    .map(|pattern| Regex::new(&format!("(?i){pattern}")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((*category, regexes))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { compiled })
    }

    /// First match per category in `text`.
    pub fn matches(&self, text: &str) -> Vec<SignatureMatch> {
        self.compiled
            .iter()
            .filter_map(|(category, regexes)| {
                regexes.iter().find_map(|re| re.find(text)).map(|m| SignatureMatch {
                    category: *category,
                    matched: m.as_str().to_string(),
                })
            })
            .collect()
    }

    /// Object keys only carry document-store operators.
    pub fn key_matches(&self, key: &str) -> Option<SignatureMatch> {
        self.compiled
            .iter()
            .find(|(category, _)| *category == Category::DocumentOperator)
            .and_then(|(category, regexes)| {
                regexes.iter().find_map(|re| re.find(key)).map(|m| SignatureMatch {
                    category: *category,
                    matched: m.as_str().to_string(),
                })
            })
    }
}
