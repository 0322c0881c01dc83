//! Canonical identifiers: lowercase, hyphenated, version-4 UUIDs.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

static CANONICAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-f0-9]{8}-[a-f0-9]{4}-4[a-f0-9]{3}-[a-f0-9]{4}-[a-f0-9]{12}$")
        .expect("canonical id pattern is valid")
});

/// Whether `value` is a 36-character lowercase v4 identifier.
pub fn is_canonical_id(value: &str) -> bool {
    CANONICAL_ID.is_match(value)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// First eight characters of an id, for log lines.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_canonical() {
        for _ in 0..16 {
            assert!(is_canonical_id(&new_id()));
        }
    }

    #[test]
    fn rejects_non_canonical_ids() {
        assert!(!is_canonical_id("node-1"));
        assert!(!is_canonical_id(""));
        // uppercase hex
        assert!(!is_canonical_id("3F2504E0-4F89-41D3-9A0C-0305E82C3301"));
        // version 1 layout
        assert!(!is_canonical_id("0b02b072-abe7-11ef-8372-fb5d162dd712"));
        // braces
        assert!(!is_canonical_id("{3f2504e0-4f89-41d3-9a0c-0305e82c3301}"));
    }

    #[test]
    fn accepts_lowercase_v4() {
        assert!(is_canonical_id("3f2504e0-4f89-41d3-9a0c-0305e82c3301"));
    }

    #[test]
    fn short_id_handles_short_and_multibyte_input() {
        assert_eq!(short_id("3f2504e0-4f89"), "3f2504e0");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("ééééééééé"), "éééééééé");
    }
}
