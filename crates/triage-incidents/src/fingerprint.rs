//! Stable error fingerprints.
//!
//! A fingerprint merges errors that differ only by embedded identifiers. The
//! message is normalized (UUIDs, long hex runs and digit runs replaced by
//! placeholders), then `name|message|path|user-bucket` is hashed with BLAKE3.
//! The user id itself never enters the hash, only whether one was present.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ErrorContext, ErrorReport};

/// Hex characters kept from the BLAKE3 digest.
pub const FINGERPRINT_LEN: usize = 16;

static UUID_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").ok()
});
static HEX_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{8,}\b").ok());
static DIGITS_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+").ok());

fn replace(re: &Lazy<Option<Regex>>, input: &str, token: &str) -> String {
    match re.as_ref() {
        Some(re) => re.replace_all(input, token).into_owned(),
        None => input.to_string(),
    }
}

/// Replaces volatile fragments of a message with placeholders.
///
/// ```
/// use triage_incidents::fingerprint::normalize_message;
///
/// assert_eq!(
///     normalize_message("order 4512 failed for deadbeef01"),
///     "order <n> failed for <hex>"
/// );
/// ```
#[must_use]
pub fn normalize_message(message: &str) -> String {
    let out = replace(&UUID_RE, message, "<uuid>");
    let out = replace(&HEX_RE, &out, "<hex>");
    replace(&DIGITS_RE, &out, "<n>")
}

/// Computes the fingerprint for an error and its context.
#[must_use]
pub fn fingerprint(error: &ErrorReport, context: &ErrorContext) -> String {
    let user_bucket = if context.has_user() { "user" } else { "anonymous" };
    let signature = format!(
        "{}|{}|{}|{}",
        error.name,
        normalize_message(&error.message),
        context.path.as_deref().unwrap_or(""),
        user_bucket,
    );

    let hash = blake3::hash(signature.as_bytes());
    let mut hex = hash.to_hex().to_string();
    hex.truncate(FINGERPRINT_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("user 42 not found", "user <n> not found" ; "digits")]
    #[test_case("id 550e8400-e29b-41d4-a716-446655440000 gone", "id <uuid> gone" ; "uuid")]
    #[test_case("object 5f2b9c1a0e44 missing", "object <hex> missing" ; "hex")]
    #[test_case("abcdef is short hex", "abcdef is short hex" ; "short hex kept")]
    #[test_case("", "" ; "empty")]
    fn normalizes(input: &str, expected: &str) {
        assert_eq!(normalize_message(input), expected);
    }

    #[test]
    fn same_error_different_users_same_fingerprint() {
        let error = ErrorReport::new("TypeError", "Cannot read property 'id' of undefined");
        let a = fingerprint(&error, &ErrorContext::new().path("/checkout").user("u1"));
        let b = fingerprint(&error, &ErrorContext::new().path("/checkout").user("u2"));
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn path_changes_fingerprint() {
        let error = ErrorReport::new("TypeError", "boom");
        let a = fingerprint(&error, &ErrorContext::new().path("/checkout"));
        let b = fingerprint(&error, &ErrorContext::new().path("/cart"));
        assert_ne!(a, b);
    }

    #[test]
    fn anonymous_and_user_buckets_differ() {
        let error = ErrorReport::new("TypeError", "boom");
        let anon = fingerprint(&error, &ErrorContext::new());
        let user = fingerprint(&error, &ErrorContext::new().user("u1"));
        assert_ne!(anon, user);
    }

    #[test]
    fn empty_report_still_fingerprints() {
        let fp = fingerprint(&ErrorReport::default(), &ErrorContext::default());
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn embedded_numbers_do_not_change_fingerprint(a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let ctx = ErrorContext::new().path("/orders");
            let first = fingerprint(&ErrorReport::new("Error", format!("order {a} failed")), &ctx);
            let second = fingerprint(&ErrorReport::new("Error", format!("order {b} failed")), &ctx);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn fingerprint_is_deterministic(name in "[A-Za-z]{0,12}", msg in ".{0,64}", path in "/[a-z]{0,10}") {
            let error = ErrorReport::new(name, msg);
            let ctx = ErrorContext::new().path(path);
            prop_assert_eq!(fingerprint(&error, &ctx), fingerprint(&error, &ctx));
        }
    }
}
