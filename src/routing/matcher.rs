//! Host pattern matching.
//!
//! # Responsibilities
//! - Compile a hostname pattern (literal or `*` single-label wildcard)
//! - Match normalized hosts against the compiled pattern
//!
//! # Design Decisions
//! - Host matching is case-insensitive (pattern and host are lowercased)
//! - `*` covers exactly one non-empty label, never a dot
//! - Whole-string match only, no partial or suffix matching

use regex::Regex;
use thiserror::Error;

/// Why a host pattern failed to compile.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("`*` must stand for a whole label, found `{label}`")]
    PartialWildcard { label: String },

    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// A compiled hostname pattern such as `api.example.wip` or `*.example.wip`.
#[derive(Debug, Clone)]
pub struct HostPattern {
    source: String,
    regex: Regex,
}

impl HostPattern {
    /// Compile a pattern. Literal labels are escaped; a `*` label becomes `[^.]+`.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let source = pattern.trim().to_ascii_lowercase();
        let mut labels = Vec::new();
        for label in source.split('.') {
            if label == "*" {
                labels.push("[^.]+".to_string());
            } else if label.contains('*') {
                return Err(PatternError::PartialWildcard {
                    label: label.to_string(),
                });
            } else {
                labels.push(regex::escape(label));
            }
        }
        let body = labels.join(r"\.");
        let regex = Regex::new(&format!("^{body}$"))?;
        Ok(Self { source, regex })
    }

    /// Returns true if the whole host matches. `host` is expected to be
    /// normalized already.
    pub fn matches(&self, host: &str) -> bool {
        self.regex.is_match(host)
    }

    /// The lowercased pattern text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for HostPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let pattern = HostPattern::compile("example.wip").unwrap();
        assert!(pattern.matches("example.wip"));
        assert!(!pattern.matches("example.wipx"));
        assert!(!pattern.matches("xexample.wip"));
        assert!(!pattern.matches("foo.example.wip"));
    }

    #[test]
    fn test_literal_pattern_case_insensitive() {
        let pattern = HostPattern::compile("Example.WIP").unwrap();
        assert_eq!(pattern.source(), "example.wip");
        assert!(pattern.matches("example.wip"));
    }

    #[test]
    fn test_dots_are_literal() {
        let pattern = HostPattern::compile("a.b").unwrap();
        assert!(!pattern.matches("axb"));
    }

    #[test]
    fn test_wildcard_single_label() {
        let pattern = HostPattern::compile("*.example.com").unwrap();
        for host in ["foo.example.com", "bar.example.com"] {
            assert!(pattern.matches(host), "failed to match {host}");
        }
        for host in [
            "example.com",
            ".example.com",
            "foo.bar.example.com",
            "foo.example.org",
            "bad.com",
            "foo.bad.com",
        ] {
            assert!(!pattern.matches(host), "incorrectly matched {host}");
        }
    }

    #[test]
    fn test_wildcard_in_middle() {
        let pattern = HostPattern::compile("api.*.wip").unwrap();
        assert!(pattern.matches("api.staging.wip"));
        assert!(!pattern.matches("api.a.b.wip"));
    }

    #[test]
    fn test_regex_metacharacters_escaped() {
        let pattern = HostPattern::compile("a+b.wip").unwrap();
        assert!(pattern.matches("a+b.wip"));
        assert!(!pattern.matches("aab.wip"));
    }

    #[test]
    fn test_partial_label_wildcard_rejected() {
        for pattern in ["foo*.wip", "**.wip", "*foo.example.wip", "api.w*p"] {
            let err = HostPattern::compile(pattern).unwrap_err();
            assert!(matches!(err, PatternError::PartialWildcard { .. }), "{pattern}: {err}");
        }
        assert!(HostPattern::compile("*.*.wip").unwrap().matches("a.b.wip"));
    }
}
