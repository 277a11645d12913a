use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Escape a string for inclusion in a single-quoted SQL literal, by
/// doubling every single quote.
pub(crate) fn escape_string_literal(s: &str) -> Cow<'_, str> {
    static STRING_LITERAL_CHARACTER_TO_ESCAPE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new("'").unwrap());

    STRING_LITERAL_CHARACTER_TO_ESCAPE_RE.replace_all(s, "''")
}
