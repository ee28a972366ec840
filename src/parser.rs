//! Parser for Kindle "My Clippings.txt" exports
//!
//! The file is a flat sequence of entries separated by `==========` lines.
//! Each entry is two header lines (title, metadata) followed by the
//! highlight body. Notes and bookmarks share the format but are discarded;
//! only highlights are emitted.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{content_hash, ParsedEntry};

/// Entry delimiter in My Clippings.txt
const ENTRY_DELIMITER: &str = "==========";

static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)location\s+(\d+(?:-\d+)?)").expect("location regex"));
static PAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)page\s+(\d+)").expect("page regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Added on\s+(.+)$").expect("date regex"));

/// Date layouts Kindle uses, tried in order. All fixed English names;
/// chrono's parser is locale-invariant so these never drift with the host.
const DATE_LAYOUTS: [&str; 4] = [
    // Monday, January 15, 2024 10:30:00 AM
    "%A, %B %d, %Y %I:%M:%S %p",
    // Monday, 15 January 2024 10:30:00
    "%A, %d %B %Y %H:%M:%S",
    // Monday, January 15, 2024, 10:30 AM
    "%A, %B %d, %Y, %I:%M %p",
    // Monday, 15 January 2024, 10:30
    "%A, %d %B %Y, %H:%M",
];

/// Parse an entire clippings file into highlight entries.
///
/// Malformed entries, notes, bookmarks, and empty-bodied highlights are
/// dropped silently; a file with no valid entries yields an empty vector.
pub fn parse_clippings(file_content: &str) -> Vec<ParsedEntry> {
    file_content
        .split(ENTRY_DELIMITER)
        .filter_map(|entry| parse_entry(entry.trim()))
        .collect()
}

/// Parse a single entry between delimiters. Returns `None` for anything
/// that is not a well-formed highlight.
fn parse_entry(entry: &str) -> Option<ParsedEntry> {
    let lines: Vec<&str> = entry
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() < 2 {
        return None;
    }

    let title_line = lines[0];
    let metadata_line = lines[1];

    // Notes and bookmarks reuse the highlight layout; skip them.
    if metadata_line.contains("Your Note on") || metadata_line.contains("Your Bookmark on") {
        return None;
    }
    if !metadata_line.contains("Your Highlight on") {
        return None;
    }

    let (book_title, author) = split_title_author(title_line);
    let location = parse_location(metadata_line);
    let date_highlighted = parse_date(metadata_line);

    let content = lines[2..].join("\n").trim().to_string();
    if content.is_empty() {
        return None;
    }

    let content_hash = content_hash(title_line, &content);

    Some(ParsedEntry {
        book_title,
        author,
        kindle_title: title_line.to_string(),
        content,
        location,
        date_highlighted,
        content_hash,
    })
}

/// Split `"Title (Author)"` into title and author.
///
/// The author is the *innermost* group of the trailing parenthetical, so
/// nested parentheses like `"Title (Author (Editor))"` resolve to `Editor`.
/// The title is everything before the opener that balances the final `)`,
/// which keeps parentheticals earlier in the title intact. Titles that
/// legitimately end in unrelated parentheses are mis-split by this
/// heuristic; that is the documented format contract and is left alone.
fn split_title_author(line: &str) -> (String, Option<String>) {
    if !line.ends_with(')') {
        return (line.to_string(), None);
    }
    let Some(open) = line.rfind('(') else {
        return (line.to_string(), None);
    };
    let after_open = &line[open + 1..];
    let Some(close) = after_open.find(')') else {
        return (line.to_string(), None);
    };
    let author = after_open[..close].trim();

    // Walk back from the final ')' to its balancing '('; the title is the
    // prefix before that opener.
    let mut depth = 0usize;
    let mut outer_open = None;
    for (i, c) in line.char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    outer_open = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(outer) = outer_open else {
        return (line.to_string(), None);
    };

    let title = line[..outer].trim();
    if author.is_empty() || title.is_empty() {
        return (line.to_string(), None);
    }

    (title.to_string(), Some(author.to_string()))
}

/// Extract the position from a metadata line. Location ranges take priority
/// over page numbers when both appear.
fn parse_location(line: &str) -> Option<String> {
    if let Some(caps) = LOCATION_RE.captures(line) {
        return Some(format!("Location {}", &caps[1]));
    }
    if let Some(caps) = PAGE_RE.captures(line) {
        return Some(format!("Page {}", &caps[1]));
    }
    None
}

/// Extract and parse the `Added on <date>` suffix. Unparseable dates are
/// non-fatal; the entry is kept with no date.
fn parse_date(line: &str) -> Option<DateTime<Utc>> {
    let caps = DATE_RE.captures(line)?;
    parse_kindle_date(&caps[1])
}

fn parse_kindle_date(date_str: &str) -> Option<DateTime<Utc>> {
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(date_str, layout).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
