//! RFC 3977 wildmat matching for newsgroup names
//!
//! A wildmat is a comma-separated list of patterns. `*` matches any run of
//! characters, `?` matches one character and `[...]` matches a character
//! class. A pattern prefixed with `!` excludes names. The last pattern that
//! matches a name decides the outcome.
//!
//! # Example
//!
//! ```
//! use nntp_store::Wildmat;
//!
//! let wildmat = Wildmat::new("comp.*,!comp.os.*").unwrap();
//! assert!(wildmat.matches("comp.lang.rust"));
//! assert!(!wildmat.matches("comp.os.linux"));
//! assert!(!wildmat.matches("alt.test"));
//! ```

use regex::Regex;

use crate::{RepositoryError, Result};

/// A compiled wildmat
#[derive(Debug, Clone)]
pub struct Wildmat {
    patterns: Vec<(bool, Regex)>,
}

impl Wildmat {
    /// Compile a wildmat expression
    pub fn new(expression: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for pattern in expression.split(',') {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            let (negated, pattern) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern),
            };
            let regex = Regex::new(&to_regex(pattern)?)
                .map_err(|e| RepositoryError::InvalidPattern(format!("{pattern}: {e}")))?;
            patterns.push((negated, regex));
        }

        if patterns.is_empty() {
            return Err(RepositoryError::InvalidPattern(format!(
                "{expression:?} contains no pattern"
            )));
        }

        Ok(Self { patterns })
    }

    /// True if `name` is selected by the wildmat
    pub fn matches(&self, name: &str) -> bool {
        self.patterns
            .iter()
            .rev()
            .find(|(_, regex)| regex.is_match(name))
            .is_some_and(|(negated, _)| !negated)
    }
}

fn to_regex(pattern: &str) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                let mut first = true;
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        ']' if !first => {
                            closed = true;
                            break;
                        }
                        '^' if first => out.push('^'),
                        '\\' | '[' | ']' | '&' | '~' => {
                            out.push('\\');
                            out.push(c);
                        }
                        _ => out.push(c),
                    }
                    first = false;
                }
                if !closed {
                    return Err(RepositoryError::InvalidPattern(format!(
                        "unterminated character class in {pattern:?}"
                    )));
                }
                out.push(']');
            }
            _ => out.push_str(&regex::escape(&ch.to_string())),
        }
    }

    out.push('$');
    Ok(out)
}
