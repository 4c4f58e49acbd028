//! FTS5 query sanitization.
//!
//! Two shapes come in: freeform text, which we turn into a safe prefix-OR
//! expression, and already-prepared FTS5 expressions, which pass through
//! untouched. Corrupt input (after stripping, nothing left) yields an
//! empty-result MATCH rather than an error, per the store's failure model.

use regex::Regex;
use std::sync::OnceLock;

fn prepared_query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^("[\p{L}\p{N}]+"\*?(\s+|$))+$"#).expect("static regex is valid")
    })
}

/// Boolean keywords and punctuation stripped from freeform input before it
/// is rebuilt into a prefix-OR expression, so a query like `foo AND "bar":`
/// can never be interpreted as raw FTS5 syntax by accident.
const STRIPPED_CHARS: &[char] = &['"', '\'', '(', ')', ':', '*'];

fn is_boolean_operator(token: &str) -> bool {
    matches!(
        token.to_ascii_uppercase().as_str(),
        "AND" | "OR" | "NOT" | "NEAR"
    )
}

/// `true` if `input` already matches the pre-formed-query shape:
/// alternating quoted terms with an optional trailing `*`.
pub fn is_prepared_query(input: &str) -> bool {
    prepared_query_re().is_match(input)
}

/// Build a MATCH expression suitable for `chunks_fts MATCH ?`.
///
/// If `input` is already a prepared FTS5 expression (per
/// [`is_prepared_query`]), it is passed through verbatim. Otherwise `input`
/// is sanitized — quotes, parens, colons, wildcards, and boolean operators
/// stripped — and rebuilt as a prefix-OR query over its tokens. An input
/// that sanitizes to nothing returns an empty string, which the caller
/// must treat as "no results", not as a query to run.
pub fn sanitize(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if is_prepared_query(trimmed) {
        return trimmed.to_string();
    }

    let cleaned: String = trimmed
        .chars()
        .map(|c| if STRIPPED_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    let terms: Vec<String> = cleaned
        .split_whitespace()
        .filter(|t| !is_boolean_operator(t))
        .map(|t| format!("{t}*"))
        .collect();

    terms.join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeform_single_token_becomes_prefix_query() {
        assert_eq!(sanitize("USearchError"), "USearchError*");
    }

    #[test]
    fn freeform_multi_token_is_prefix_ored() {
        assert_eq!(sanitize("how does Foo work"), "how* OR does* OR Foo* OR work*");
    }

    #[test]
    fn strips_quotes_parens_colons_and_booleans() {
        assert_eq!(sanitize("(foo) AND \"bar\": baz"), "foo* OR bar* OR baz*");
    }

    #[test]
    fn prepared_query_passes_through_verbatim() {
        let prepared = "\"foo\"* \"bar\"";
        assert_eq!(sanitize(prepared), prepared);
    }

    #[test]
    fn sanitize_is_idempotent_on_prepared_input() {
        let once = sanitize("foo bar");
        let twice = sanitize(&once);
        // `once` is itself a prepared-shaped query only if it matches the
        // quoted-term grammar; prefix-OR output isn't quoted, so re-running
        // sanitize on it re-derives the same tokens rather than mutating
        // them further.
        assert_eq!(sanitize(&twice), once);
    }

    #[test]
    fn empty_or_purely_punctuation_input_sanitizes_to_empty() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   "), "");
        assert_eq!(sanitize("():\"'"), "");
    }
}
