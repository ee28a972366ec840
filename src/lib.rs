//! Kindling - Kindle clippings ingestion and search core
//!
//! Turns a Kindle "My Clippings.txt" export into deduplicated, searchable
//! records backed by SQLite.
//!
//! # Architecture
//! - `parser`: splits the export into entries and recovers book identity,
//!   location, timestamp, and highlight text
//! - `models`: persistent and ephemeral data types plus the content hash
//! - `database`: SQLite schema, FTS5 index kept in sync by triggers, CRUD
//! - `query`: sanitizes free text into safe FTS and LIKE forms
//! - `importer`: drives the parser and folds write outcomes into counts
//! - `store`: public facade with cached book listing and debounced search
//!
//! Book identity is the verbatim title line (`kindle_title`); highlight
//! identity is a SHA-256 over that line plus the highlight text, so
//! re-imports and re-captures of the same passage collapse to one row.

mod database;
mod importer;
mod models;
mod parser;
mod query;
mod store;

pub use database::{Database, DatabaseError, DatabaseResult, InsertOutcome};
pub use importer::import_clippings;
pub use models::{content_hash, Book, Highlight, ImportResult, ParsedEntry, Tag};
pub use parser::parse_clippings;
pub use query::{fts_match_expression, like_pattern, MIN_QUERY_LEN};
pub use store::{HighlightStore, StoreError};
