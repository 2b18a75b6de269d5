//! Deterministic cache-key construction.
//!
//! Every storage key flows through [`KeyBuilder`]. Two semantically equal
//! inputs always produce byte-identical keys, whatever their field order or
//! construction path, so "phantom" misses caused by key drift cannot occur.

use crate::{CacheError, CacheResult};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// An already-normalized storage key. Only [`KeyBuilder`] creates these.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key, returning its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Why a key would be rejected by common backend key-spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValidationError {
    /// Key is empty.
    Empty,
    /// Key is longer than the configured maximum.
    TooLong { length: usize, maximum: usize },
    /// Key contains whitespace.
    Whitespace { position: usize },
    /// Key contains a control character.
    ControlCharacter { position: usize },
    /// Key contains a character outside printable ASCII.
    NonAscii { position: usize },
}

impl fmt::Display for KeyValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "key is empty"),
            Self::TooLong { length, maximum } => {
                write!(f, "key is {} bytes long (maximum {})", length, maximum)
            }
            Self::Whitespace { position } => write!(f, "whitespace at byte {}", position),
            Self::ControlCharacter { position } => {
                write!(f, "control character at byte {}", position)
            }
            Self::NonAscii { position } => write!(f, "non-ASCII character at byte {}", position),
        }
    }
}

impl std::error::Error for KeyValidationError {}

/// Builds namespaced, normalized cache keys.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
    separator: String,
    max_length: usize,
}

impl KeyBuilder {
    /// Default maximum key length (the Memcached limit).
    pub const DEFAULT_MAX_LENGTH: usize = 250;
    /// Default separator between namespace and key body.
    pub const DEFAULT_SEPARATOR: &'static str = ":";
    /// Marker segment used for hashed keys.
    const HASH_MARKER: &'static str = "h";
    /// Prepended to bodies that would otherwise read as a hashed key.
    const ESCAPE: char = '~';
    /// Hex length of a SHA-256 digest.
    const DIGEST_HEX_LEN: usize = 64;

    /// Creates a builder with the default separator and maximum length.
    pub fn new(namespace: impl Into<String>) -> CacheResult<Self> {
        Self::with_options(namespace, Self::DEFAULT_SEPARATOR, Self::DEFAULT_MAX_LENGTH)
    }

    /// Creates a builder with explicit options.
    ///
    /// Fails when the hashed form of a key could not fit in `max_length`, or
    /// when the namespace itself would fail [`KeyBuilder::validate`].
    pub fn with_options(
        namespace: impl Into<String>,
        separator: impl Into<String>,
        max_length: usize,
    ) -> CacheResult<Self> {
        let builder = Self {
            namespace: namespace.into().trim().to_string(),
            separator: separator.into(),
            max_length,
        };

        if builder.separator.is_empty() {
            return Err(CacheError::configuration("key separator cannot be empty"));
        }

        let hashed_len = builder.hashed_prefix().len() + Self::DIGEST_HEX_LEN;
        if hashed_len > max_length {
            return Err(CacheError::configuration(format!(
                "key max_length {} cannot hold a hashed key of {} bytes",
                max_length, hashed_len
            )));
        }

        let sample = format!("{}{}", builder.prefix(), "x");
        if let Err(reason) = builder.validate(&sample) {
            return Err(CacheError::configuration(format!(
                "invalid key namespace '{}': {}",
                builder.namespace, reason
            )));
        }

        Ok(builder)
    }

    /// The configured namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The configured maximum key length.
    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    /// Glob matching every key this builder can produce. Glob
    /// metacharacters in the namespace are escaped.
    #[must_use]
    pub fn namespace_glob(&self) -> String {
        let mut glob = String::with_capacity(self.prefix().len() + 1);
        for ch in self.prefix().chars() {
            if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
                glob.push('\\');
            }
            glob.push(ch);
        }
        glob.push('*');
        glob
    }

    /// Returns true when built keys carry a namespace prefix.
    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Builds a key from a string, trimming surrounding whitespace.
    #[must_use]
    pub fn build(&self, input: &str) -> CacheKey {
        self.finish(input.trim())
    }

    /// Builds a key from several segments joined by the separator.
    #[must_use]
    pub fn build_parts(&self, parts: &[&str]) -> CacheKey {
        let body = parts
            .iter()
            .map(|part| part.trim())
            .collect::<Vec<_>>()
            .join(&self.separator);
        self.finish(&body)
    }

    /// Builds a key from structured input.
    ///
    /// Object fields are sorted recursively before serialization, so the key
    /// does not depend on field order.
    pub fn build_structured<T: Serialize + ?Sized>(&self, input: &T) -> CacheResult<CacheKey> {
        let value = serde_json::to_value(input)?;
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical)?;
        Ok(self.finish(&canonical))
    }

    /// Checks a key against the characters common backends reject.
    pub fn validate(&self, key: &str) -> Result<(), KeyValidationError> {
        if key.is_empty() {
            return Err(KeyValidationError::Empty);
        }
        if key.len() > self.max_length {
            return Err(KeyValidationError::TooLong {
                length: key.len(),
                maximum: self.max_length,
            });
        }

        for (position, ch) in key.char_indices() {
            if ch.is_whitespace() {
                return Err(KeyValidationError::Whitespace { position });
            }
            if ch.is_control() {
                return Err(KeyValidationError::ControlCharacter { position });
            }
            if !ch.is_ascii() {
                return Err(KeyValidationError::NonAscii { position });
            }
        }

        Ok(())
    }

    fn prefix(&self) -> String {
        if self.namespace.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.namespace, self.separator)
        }
    }

    fn hashed_prefix(&self) -> String {
        format!("{}{}{}", self.prefix(), Self::HASH_MARKER, self.separator)
    }

    /// True for bodies that must be escaped to stay distinct from hashed keys.
    fn is_reserved(&self, body: &str) -> bool {
        body.starts_with(Self::ESCAPE)
            || body
                .strip_prefix(Self::HASH_MARKER)
                .is_some_and(|rest| rest.starts_with(self.separator.as_str()))
    }

    fn finish(&self, canonical: &str) -> CacheKey {
        let key = if self.is_reserved(canonical) {
            format!("{}{}{}", self.prefix(), Self::ESCAPE, canonical)
        } else {
            format!("{}{}", self.prefix(), canonical)
        };
        if key.len() <= self.max_length {
            return CacheKey(key);
        }

        let mut hasher = Sha256::new();
        hasher.update(canonical.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(canonical.as_bytes());
        let digest = hex::encode(hasher.finalize());

        CacheKey(format!("{}{}", self.hashed_prefix(), digest))
    }
}

/// Writes `value` as compact JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) -> CacheResult<()> {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (index, (name, field)) in fields.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(name)?);
                out.push(':');
                write_canonical(field, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn builder() -> KeyBuilder {
        KeyBuilder::new("app").unwrap()
    }

    #[test]
    fn test_string_key_is_trimmed_and_prefixed() {
        assert_eq!(builder().build("  user:1  ").as_str(), "app:user:1");
    }

    #[test]
    fn test_empty_namespace_has_no_prefix() {
        let builder = KeyBuilder::new("").unwrap();
        assert_eq!(builder.build("user:1").as_str(), "user:1");
    }

    #[test]
    fn test_build_parts() {
        let key = builder().build_parts(&["user", " 42 ", "profile"]);
        assert_eq!(key.as_str(), "app:user:42:profile");
    }

    #[test]
    fn test_structured_key_ignores_field_order() {
        let a = json!({"name": "Ann", "id": 1, "nested": {"z": 1, "a": [1, 2]}});
        let b = json!({"nested": {"a": [1, 2], "z": 1}, "id": 1, "name": "Ann"});
        assert_eq!(
            builder().build_structured(&a).unwrap(),
            builder().build_structured(&b).unwrap()
        );
    }

    #[test]
    fn test_structured_key_from_struct_and_map_agree() {
        #[derive(Serialize)]
        struct Query {
            page: u32,
            filter: &'static str,
        }

        let mut map = HashMap::new();
        map.insert("filter", json!("active"));
        map.insert("page", json!(2));

        let from_struct = builder()
            .build_structured(&Query { page: 2, filter: "active" })
            .unwrap();
        let from_map = builder().build_structured(&map).unwrap();
        assert_eq!(from_struct, from_map);
        assert_eq!(from_struct.as_str(), r#"app:{"filter":"active","page":2}"#);
    }

    #[test]
    fn test_long_key_is_hashed_within_limit() {
        let builder = KeyBuilder::with_options("app", ":", 80).unwrap();
        let long = "x".repeat(200);
        let key = builder.build(&long);

        assert!(key.len() <= 80);
        assert!(key.as_str().starts_with("app:h:"));
        assert_eq!(key, builder.build(&long));
        assert_ne!(key, builder.build(&"x".repeat(201)));
    }

    #[test]
    fn test_max_length_too_small_is_configuration_error() {
        let err = KeyBuilder::with_options("app", ":", 10).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_namespace_with_space_is_rejected() {
        assert!(KeyBuilder::new("my app").is_err());
    }

    #[test]
    fn test_validate_reasons() {
        let builder = builder();
        assert_eq!(builder.validate(""), Err(KeyValidationError::Empty));
        assert_eq!(
            builder.validate("a b"),
            Err(KeyValidationError::Whitespace { position: 1 })
        );
        assert_eq!(
            builder.validate("a\u{7}"),
            Err(KeyValidationError::ControlCharacter { position: 1 })
        );
        assert_eq!(
            builder.validate("café"),
            Err(KeyValidationError::NonAscii { position: 3 })
        );
        assert!(matches!(
            builder.validate(&"k".repeat(300)),
            Err(KeyValidationError::TooLong { length: 300, maximum: 250 })
        ));
        assert!(builder.validate("app:user:1").is_ok());
    }

    #[test]
    fn test_namespace_glob() {
        assert_eq!(builder().namespace_glob(), "app:*");
        assert_eq!(KeyBuilder::new("a*b").unwrap().namespace_glob(), r"a\*b:*");
        assert!(!KeyBuilder::new("").unwrap().is_namespaced());
    }

    #[test]
    fn test_short_input_cannot_mimic_hashed_key() {
        let builder = KeyBuilder::with_options("app", ":", 80).unwrap();
        let hashed = builder.build(&"x".repeat(200));
        let body = hashed.as_str().trim_start_matches("app:");

        let mimic = builder.build(body);
        assert_ne!(mimic, hashed);
        assert_eq!(mimic.as_str(), format!("app:~{}", body));
        // Escaping stays injective.
        assert_ne!(builder.build("~h:1"), builder.build("h:1"));
        assert_eq!(builder.build("hello").as_str(), "app:hello");
    }

    proptest! {
        #[test]
        fn prop_structured_keys_are_order_independent(
            fields in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..12)
        ) {
            let forward: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            let reversed: HashMap<String, Value> = fields
                .iter()
                .rev()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();

            let builder = builder();
            prop_assert_eq!(
                builder.build_structured(&forward).unwrap(),
                builder.build_structured(&reversed).unwrap()
            );
        }

        #[test]
        fn prop_built_keys_never_exceed_max_length(body in "[a-zA-Z0-9:]{0,600}") {
            let builder = builder();
            prop_assert!(builder.build(&body).len() <= builder.max_length());
        }
    }
}
