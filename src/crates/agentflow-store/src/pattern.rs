//! Glob-style pattern matching over colon-segmented signal names.
//!
//! `*` matches exactly one segment (including an empty one); `**` matches
//! one or more segments. A bus compiles each subscriber's pattern once and
//! caches it; this module only contains the pure matching logic.

use std::fmt;

/// A pattern compiled from its textual form. Two patterns with the same
/// source string always produce the same compiled form (no hidden state),
/// so compiling is idempotent.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    segments: Vec<Seg>,
}

#[derive(Debug, Clone, PartialEq)]
enum Seg {
    Literal(String),
    One,      // `*`
    Many,     // `**`
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> Self {
        let segments = pattern
            .split(':')
            .map(|s| match s {
                "*" => Seg::One,
                "**" => Seg::Many,
                other => Seg::Literal(other.to_string()),
            })
            .collect();
        Self {
            source: pattern.to_string(),
            segments,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, name: &str) -> bool {
        let name_segs: Vec<&str> = name.split(':').collect();
        match_segs(&self.segments, &name_segs)
    }
}

fn match_segs(pattern: &[Seg], name: &[&str]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(Seg::Many), _) => {
            // `**` must consume at least one segment, then may consume more.
            if name.is_empty() {
                return false;
            }
            (1..=name.len()).any(|take| match_segs(&pattern[1..], &name[take..]))
        }
        (Some(Seg::One), Some(_)) => match_segs(&pattern[1..], &name[1..]),
        (Some(Seg::One), None) => false,
        (Some(Seg::Literal(lit)), Some(seg)) => lit == seg && match_segs(&pattern[1..], &name[1..]),
        (Some(Seg::Literal(_)), None) => false,
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Convenience one-shot match, used by stores filtering loaded signals.
/// Prefer compiling once via [`CompiledPattern::compile`] in hot paths.
pub fn matches(pattern: &str, name: &str) -> bool {
    CompiledPattern::compile(pattern).matches(name)
}

pub fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| matches(p, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_exact_name_only() {
        let p = CompiledPattern::compile("node:start");
        assert!(p.matches("node:start"));
        assert!(!p.matches("node:complete"));
        assert!(!p.matches("node:start:extra"));
    }

    #[test]
    fn single_star_matches_one_segment() {
        let p = CompiledPattern::compile("node:*");
        assert!(p.matches("node:start"));
        assert!(p.matches("node:"));
        assert!(!p.matches("node:start:extra"));
        assert!(!p.matches("node"));
    }

    #[test]
    fn double_star_matches_one_or_more_segments() {
        let p = CompiledPattern::compile("agent:**");
        assert!(p.matches("agent:activated"));
        assert!(p.matches("agent:tool:start"));
        assert!(!p.matches("agent"));
    }

    #[test]
    fn double_star_in_middle() {
        let p = CompiledPattern::compile("a:**:z");
        assert!(p.matches("a:b:z"));
        assert!(p.matches("a:b:c:z"));
        assert!(!p.matches("a:z"));
    }

    #[test]
    fn compilation_is_idempotent() {
        let p1 = CompiledPattern::compile("node:*");
        let p2 = CompiledPattern::compile("node:*");
        assert_eq!(p1.matches("node:start"), p2.matches("node:start"));
    }
}
