//! Core data models for Kindling
//!
//! Persistent types (`Book`, `Highlight`, `Tag`) mirror the database schema;
//! `ParsedEntry` is the ephemeral output of the clippings parser and never
//! outlives an import pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deduplication key for a highlight: SHA-256 over the verbatim title line
/// concatenated with the highlight text, rendered as lowercase hex.
///
/// Deliberately excludes location and date so that the same passage captured
/// on different days collapses to one stored row.
pub fn content_hash(kindle_title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kindle_title.as_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One highlight recovered from a clippings file entry.
///
/// Produced by [`crate::parse_clippings`], consumed immediately by the
/// importer, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub book_title: String,
    pub author: Option<String>,
    /// The raw, unparsed title line. Kindle exports repeat it byte-for-byte
    /// across exports of the same book, which makes it the only stable
    /// book-identity key.
    pub kindle_title: String,
    pub content: String,
    /// `"Location 123-456"` or `"Page 42"`.
    pub location: Option<String>,
    pub date_highlighted: Option<DateTime<Utc>>,
    pub content_hash: String,
}

/// A book row, optionally carrying the aggregate highlight count when
/// hydrated via the book listing query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub kindle_title: String,
    pub created_at: DateTime<Utc>,
    pub highlight_count: i64,
}

/// A stored highlight. `book_title` / `book_author` are populated only by
/// queries that join against `books` (search, listings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: i64,
    pub book_id: i64,
    pub content: String,
    pub location: Option<String>,
    pub date_highlighted: Option<DateTime<Utc>>,
    pub date_imported: DateTime<Utc>,
    pub is_favorite: bool,
    pub content_hash: String,
    pub book_title: Option<String>,
    pub book_author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

/// Aggregate outcome of one import pass. `total` counts parsed entries;
/// `skipped` covers both duplicates and per-entry storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub total: usize,
}
