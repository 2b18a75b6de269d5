//! Glob patterns for `clear`, matched against keys or tags.

use crate::{CacheError, CacheResult};
use regex::Regex;
use std::collections::BTreeSet;

/// What a [`ClearPattern`] is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternScope {
    /// Matches when the key or any tag matches.
    KeyOrTag,
    /// Matches only tags.
    TagOnly,
}

/// A Redis-style glob (`*`, `?`, `[abc]`, `[!a-z]`) used for bulk invalidation.
#[derive(Debug, Clone)]
pub struct ClearPattern {
    source: String,
    regex: Regex,
    scope: PatternScope,
}

impl ClearPattern {
    /// Pattern matched against keys and tags.
    pub fn glob(pattern: &str) -> CacheResult<Self> {
        Self::compile(pattern, PatternScope::KeyOrTag)
    }

    /// Pattern matched against tags only.
    pub fn tag(pattern: &str) -> CacheResult<Self> {
        Self::compile(pattern, PatternScope::TagOnly)
    }

    fn compile(pattern: &str, scope: PatternScope) -> CacheResult<Self> {
        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
            CacheError::configuration(format!("invalid clear pattern '{}': {}", pattern, e))
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            scope,
        })
    }

    /// The original glob text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// What this pattern is matched against.
    #[must_use]
    pub const fn scope(&self) -> PatternScope {
        self.scope
    }

    /// Glob usable for key enumeration in a store, if keys can match at all.
    #[must_use]
    pub fn key_glob(&self) -> Option<&str> {
        match self.scope {
            PatternScope::KeyOrTag => Some(&self.source),
            PatternScope::TagOnly => None,
        }
    }

    /// Returns true if the key text matches (ignores scope).
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// Returns true if any tag matches.
    #[must_use]
    pub fn matches_tags(&self, tags: &BTreeSet<String>) -> bool {
        tags.iter().any(|tag| self.regex.is_match(tag))
    }

    /// Returns true if an entry with this key and tags should be cleared.
    #[must_use]
    pub fn matches(&self, key: &str, tags: &BTreeSet<String>) -> bool {
        match self.scope {
            PatternScope::KeyOrTag => self.matches_key(key) || self.matches_tags(tags),
            PatternScope::TagOnly => self.matches_tags(tags),
        }
    }
}

/// Translates a glob into an anchored regex. An unterminated `[` is literal.
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&regex::escape(&chars[i].to_string()));
            }
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(offset) if offset > 0 => {
                    let body: String = chars[i + 1..i + 1 + offset].iter().collect();
                    out.push('[');
                    let body = match body.strip_prefix('!').or_else(|| body.strip_prefix('^')) {
                        Some(rest) => {
                            out.push('^');
                            rest.to_string()
                        }
                        None => body,
                    };
                    for ch in body.chars() {
                        if matches!(ch, '[' | ']' | '\\' | '&' | '~' | '^') {
                            out.push('\\');
                        }
                        out.push(ch);
                    }
                    out.push(']');
                    i += offset + 1;
                }
                _ => out.push_str(r"\["),
            },
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_star_and_question_mark() {
        let pattern = ClearPattern::glob("app:user:*").unwrap();
        assert!(pattern.matches_key("app:user:1"));
        assert!(pattern.matches_key("app:user:"));
        assert!(!pattern.matches_key("app:order:1"));

        let pattern = ClearPattern::glob("app:user:?").unwrap();
        assert!(pattern.matches_key("app:user:7"));
        assert!(!pattern.matches_key("app:user:42"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let pattern = ClearPattern::glob("app:{id}.v1").unwrap();
        assert!(pattern.matches_key("app:{id}.v1"));
        assert!(!pattern.matches_key("app:{id}xv1"));
    }

    #[test]
    fn test_character_classes() {
        let pattern = ClearPattern::glob("k[ab]").unwrap();
        assert!(pattern.matches_key("ka"));
        assert!(!pattern.matches_key("kc"));

        let negated = ClearPattern::glob("k[!ab]").unwrap();
        assert!(negated.matches_key("kc"));
        assert!(!negated.matches_key("ka"));
    }

    #[test]
    fn test_unterminated_bracket_is_literal() {
        let pattern = ClearPattern::glob("k[a").unwrap();
        assert!(pattern.matches_key("k[a"));
    }

    #[test]
    fn test_key_or_tag_scope() {
        let pattern = ClearPattern::glob("users").unwrap();
        assert!(pattern.matches("app:x", &tags(&["users"])));
        assert!(!pattern.matches("app:x", &tags(&["orders"])));
        assert_eq!(pattern.key_glob(), Some("users"));
    }

    #[test]
    fn test_tag_scope_ignores_key() {
        let pattern = ClearPattern::tag("app:*").unwrap();
        assert!(!pattern.matches("app:x", &tags(&[])));
        assert!(pattern.matches("other", &tags(&["app:session"])));
        assert_eq!(pattern.key_glob(), None);
    }

    #[test]
    fn test_escaped_glob_characters() {
        let pattern = ClearPattern::glob(r"a\*b").unwrap();
        assert!(pattern.matches_key("a*b"));
        assert!(!pattern.matches_key("axb"));
    }
}
