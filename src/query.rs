//! Search query sanitization
//!
//! User input is turned into two safe forms: an FTS5 MATCH expression for
//! highlight content, and a LIKE pattern for the book-metadata fallback.
//! Neither form can make SQLite raise on arbitrary input.

/// Queries shorter than this return no results instead of scanning the
/// whole table on every keystroke.
pub const MIN_QUERY_LEN: usize = 2;

/// Characters with special meaning in the FTS5 query syntax. Stripped
/// (not escaped) from every term.
const FTS_SPECIALS: &[char] = &['"', '*', '^', '(', ')', ':', '+', '-'];

/// Build an FTS5 MATCH expression from free text.
///
/// Each whitespace-separated word is sanitized and suffixed with `*` for
/// prefix matching; terms are implicitly ANDed, order-independent. If no
/// term survives sanitization the expression degenerates to `""`, an empty
/// phrase that matches nothing rather than everything.
pub fn fts_match_expression(raw: &str) -> String {
    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !FTS_SPECIALS.contains(c)).collect())
        .filter(|word: &String| !word.is_empty())
        .collect();

    if terms.is_empty() {
        return "\"\"".to_string();
    }

    terms
        .iter()
        .map(|word| format!("{word}*"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a `%...%` LIKE pattern matching the raw query as a literal
/// substring. Backslash is escaped first so the later escapes stay literal;
/// queries must run with `ESCAPE '\'`.
pub fn like_pattern(raw: &str) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
