//! Header sanitizer applied to every captured request before it is stored.

use std::collections::BTreeMap;

/// Header names never kept from captured traffic (compared case-insensitively).
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "x-api-key", "x-auth-token"];

pub fn is_sensitive(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| name.eq_ignore_ascii_case(sensitive))
}

/// Drop every deny-listed header, leaving the remaining keys untouched.
pub fn sanitize_headers(headers: BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .into_iter()
        .filter(|(name, _)| !is_sensitive(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_strips_deny_list_case_insensitively() {
        let input = headers(&[
            ("Authorization", "Bearer abc"),
            ("COOKIE", "session=1"),
            ("X-API-Key", "k"),
            ("x-auth-token", "t"),
            ("Content-Type", "application/json"),
            ("X-Request-Id", "42"),
        ]);

        let out = sanitize_headers(input);

        assert_eq!(
            out,
            headers(&[("Content-Type", "application/json"), ("X-Request-Id", "42")])
        );
    }

    #[test]
    fn test_preserves_key_spelling() {
        let out = sanitize_headers(headers(&[("x-CUSTOM-header", "v")]));
        assert!(out.contains_key("x-CUSTOM-header"));
    }

    #[test]
    fn test_lookalike_names_survive() {
        let out = sanitize_headers(headers(&[("X-Api-Key-Id", "1"), ("Cookies", "2")]));
        assert_eq!(out.len(), 2);
    }
}
