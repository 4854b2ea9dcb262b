//! Naming and identity validation shared by the configuration and
//! reconciliation layers.
//!
//! Tower only accepts `[A-Za-z0-9_-]` in organization and workspace names,
//! and resource labels use the same alphabet with `_` as filler.

use once_cell::sync::Lazy;
use regex::Regex;

static INVALID_NAME_CHAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static regex is valid"));

static INVALID_TAG_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("static regex is valid"));

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static regex is valid")
});

/// Derive a URL-safe Tower name by replacing every disallowed character with `-`.
///
/// ```
/// assert_eq!(nftower_core::get_valid_name("Sage Bionetworks"), "Sage-Bionetworks");
/// ```
pub fn get_valid_name(full_name: &str) -> String {
    INVALID_NAME_CHAR.replace_all(full_name, "-").into_owned()
}

/// Replace each run of characters outside `[A-Za-z0-9_-]` with a single `_`.
pub fn sanitize_tag(value: &str) -> String {
    INVALID_TAG_CHARS.replace_all(value, "_").into_owned()
}

/// Whether `candidate` looks like `local@domain.tld` with a 2+ letter TLD.
pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_valid_name() {
        assert_eq!(get_valid_name("Sage Bionetworks"), "Sage-Bionetworks");
        assert_eq!(get_valid_name("foo-project"), "foo-project");
        assert_eq!(get_valid_name("a.b/c_d"), "a-b-c_d");
    }

    #[test]
    fn test_get_valid_name_replaces_each_character() {
        assert_eq!(get_valid_name("a  b"), "a--b");
    }

    #[test]
    fn test_sanitize_tag_collapses_runs() {
        assert_eq!(sanitize_tag("Cost Center"), "Cost_Center");
        assert_eq!(sanitize_tag("program/ABC 123"), "program_ABC_123");
        assert_eq!(sanitize_tag("a -- b"), "a_--_b");
        assert_eq!(sanitize_tag("already_valid-1"), "already_valid-1");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("bruno.grande@sagebase.org"));
        assert!(is_valid_email("first+tag@sub.example.io"));
        assert!(!is_valid_email("thomas.yu"));
        assert!(!is_valid_email("user@domain.c"));
        assert!(!is_valid_email("user@@domain.com"));
    }
}
