//! Compiles path glob patterns and matches request paths against them.
//!
//! Grammar: a pattern is a sequence of `/`-separated segments. A literal
//! segment matches exactly. The token `*` inside a segment matches any
//! non-`/` run; a trailing `/*` after a prefix matches any suffix, including
//! the empty suffix. Matching is case-sensitive and anchored on both ends.
//!
//! `/api/v1/auth/*` matches `/api/v1/auth/login` and `/api/v1/auth/users/42`.
//! `/api/v1/*/items/*` matches `/api/v1/content/items/3`.

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RouteMatchError {
    #[error("invalid route pattern: {pattern}")]
    InvalidPattern { pattern: String },

    #[error("regex compilation failed: {0}")]
    RegexError(String),
}

/// A glob pattern compiled once into an anchored regular expression.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    regex: Regex,
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> Result<Self, RouteMatchError> {
        if pattern.is_empty() || !pattern.starts_with('/') {
            return Err(RouteMatchError::InvalidPattern {
                pattern: pattern.to_string(),
            });
        }
        let regex_source = Self::to_regex_source(pattern);
        let regex = Regex::new(&regex_source).map_err(|e| RouteMatchError::RegexError(e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// `true` when `path` satisfies this compiled pattern. O(|path|), no
    /// allocation on the match path itself.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    fn to_regex_source(pattern: &str) -> String {
        // A trailing "/*" segment means "any suffix, including none" -- strip
        // it and append an optional-suffix alternative instead of compiling
        // it as an ordinary segment wildcard.
        let (prefix, suffix_wildcard) = match pattern.strip_suffix("/*") {
            Some(stripped) => (stripped, true),
            None => (pattern, false),
        };

        let mut out = String::with_capacity(pattern.len() * 2);
        out.push('^');
        for segment in prefix.split('/') {
            if segment.is_empty() {
                continue;
            }
            out.push('/');
            out.push_str(&Self::segment_to_regex(segment));
        }
        if prefix.is_empty() {
            // whole pattern was "/*" or "/"
        }
        if suffix_wildcard {
            out.push_str("(?:/.*)?");
        }
        out.push('$');
        out
    }

    fn segment_to_regex(segment: &str) -> String {
        let mut out = String::with_capacity(segment.len() * 2);
        for ch in segment.chars() {
            match ch {
                '*' => out.push_str("[^/]*"),
                '.' | '?' | '+' | '^' | '$' | '[' | ']' | '(' | ')' | '|' | '\\' | '{' | '}' => {
                    out.push('\\');
                    out.push(ch);
                }
                _ => out.push(ch),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_segment_matches_exactly() {
        let p = CompiledPattern::compile("/health").unwrap();
        assert!(p.matches("/health"));
        assert!(!p.matches("/healthy"));
    }

    #[test]
    fn trailing_glob_matches_any_suffix_including_empty() {
        let p = CompiledPattern::compile("/api/v1/auth/*").unwrap();
        assert!(p.matches("/api/v1/auth/login"));
        assert!(p.matches("/api/v1/auth/users/42"));
        assert!(p.matches("/api/v1/auth"));
        assert!(!p.matches("/api/v1/other"));
    }

    #[test]
    fn segment_glob_matches_single_segment() {
        let p = CompiledPattern::compile("/api/v1/*/items/*").unwrap();
        assert!(p.matches("/api/v1/content/items/3"));
        assert!(!p.matches("/api/v1/content/sub/items/3"));
    }

    #[test]
    fn case_sensitive() {
        let p = CompiledPattern::compile("/Health").unwrap();
        assert!(!p.matches("/health"));
    }

    #[test]
    fn rejects_pattern_without_leading_slash() {
        assert!(CompiledPattern::compile("health").is_err());
    }
}
