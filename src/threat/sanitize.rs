//! Neutralisation of flagged string leaves.
//!
//! Stripping runs to a fixpoint so that removing one sequence cannot expose
//! another (`-;-` becomes `--`). Quotes are escaped last, after every
//! backslash has been stripped, which keeps `sanitize(sanitize(x)) == sanitize(x)`.

use regex::Regex;

const ENCODED_QUOTES: &str = r"(?i)%25(27|22|3b)|%27|%22|%3b|%00|0x2[27]|&#(39|34|x27|x22);";
const SCRIPT_SCHEMES: &str = r"(?i)(javascript|vbscript)\s*:|data:text/html";
const COMMENT_DELIMITERS: [&str; 3] = ["--", "/*", "*/"];
const STRIPPED_CHARS: [char; 4] = [';', '\\', '<', '>'];

/// Rewrites flagged strings. Patterns are compiled once per detector.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    encoded_quotes: Regex,
    script_schemes: Regex,
}

impl Sanitizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            encoded_quotes: Regex::new(ENCODED_QUOTES)?,
            script_schemes: Regex::new(SCRIPT_SCHEMES)?,
        })
    }

    fn strip_once(&self, input: &str) -> String {
        let out = self.encoded_quotes.replace_all(input, "");
        let mut out = self.script_schemes.replace_all(&out, "").into_owned();
        for delimiter in COMMENT_DELIMITERS {
            out = out.replace(delimiter, "");
        }
        out.retain(|c| !STRIPPED_CHARS.contains(&c));
        out
    }

    /// Strip injection syntax and escape quotes.
    pub fn sanitize(&self, input: &str) -> String {
        let mut current = input.to_string();
        loop {
            let next = self.strip_once(&current);
            if next == current {
                break;
            }
            current = next;
        }

        let mut escaped = String::with_capacity(current.len());
        for c in current.chars() {
            if c == '\'' || c == '"' {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}
