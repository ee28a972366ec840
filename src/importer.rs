//! Clippings ingestion
//!
//! Drives the parser over a whole file and folds the per-entry write
//! outcomes into an [`ImportResult`]. Entries are independent: a storage
//! failure on one is counted as a skip and the batch continues, while every
//! committed row is durable immediately.

use tracing::{debug, info};

use crate::database::{Database, DatabaseResult, InsertOutcome};
use crate::models::{ImportResult, ParsedEntry};
use crate::parser::parse_clippings;

/// Ingest an entire clippings file in file order.
///
/// Books are resolved find-or-create by the verbatim title line, so the
/// first occurrence of a `kindle_title` creates the row and later entries
/// reuse it. Duplicate highlights (same content hash anywhere in the store)
/// and per-entry storage failures both count as skipped.
pub fn import_clippings(db: &Database, file_content: &str) -> ImportResult {
    let entries = parse_clippings(file_content);
    let total = entries.len();

    let mut imported = 0;
    let mut skipped = 0;

    for entry in &entries {
        match ingest_entry(db, entry) {
            Ok(InsertOutcome::Created(_)) => imported += 1,
            Ok(InsertOutcome::Duplicate) => {
                debug!(kindle_title = %entry.kindle_title, "skipped duplicate highlight");
                skipped += 1;
            }
            Err(err) => {
                debug!(kindle_title = %entry.kindle_title, %err, "entry failed, skipping");
                skipped += 1;
            }
        }
    }

    info!(imported, skipped, total, "clippings import finished");
    ImportResult {
        imported,
        skipped,
        total,
    }
}

fn ingest_entry(db: &Database, entry: &ParsedEntry) -> DatabaseResult<InsertOutcome> {
    let book_id = db.find_or_create_book(
        &entry.book_title,
        entry.author.as_deref(),
        &entry.kindle_title,
    )?;
    db.insert_highlight_if_absent(
        book_id,
        &entry.content,
        entry.location.as_deref(),
        entry.date_highlighted,
        &entry.content_hash,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, location: u32, body: &str) -> String {
        format!(
            "{title}\n- Your Highlight on Location {location}-{} | Added on Monday, January 15, 2024 10:30:00 AM\n\n{body}\n==========\n",
            location + 10
        )
    }

    #[test]
    fn test_import_counts() {
        let db = Database::open_in_memory().unwrap();
        let content = [
            entry("Book One (Alice)", 10, "first passage"),
            entry("Book One (Alice)", 20, "second passage"),
            entry("Book Two (Bob)", 30, "third passage"),
        ]
        .concat();

        let result = import_clippings(&db, &content);
        assert_eq!(
            result,
            ImportResult {
                imported: 3,
                skipped: 0,
                total: 3
            }
        );
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let content = entry("Book (Author)", 10, "a passage");

        let first = import_clippings(&db, &content);
        assert_eq!(first.imported, 1);

        let second = import_clippings(&db, &content);
        assert_eq!(
            second,
            ImportResult {
                imported: 0,
                skipped: 1,
                total: 1
            }
        );
    }

    #[test]
    fn test_same_passage_different_capture_dates_collapses() {
        let db = Database::open_in_memory().unwrap();
        let content = [
            "Book (Author)\n- Your Highlight on Location 10-20 | Added on Monday, January 15, 2024 10:30:00 AM\n\nthe very same passage\n==========\n".to_string(),
            "Book (Author)\n- Your Highlight on Location 10-20 | Added on Friday, 26 April 2024 16:02:10\n\nthe very same passage\n==========\n".to_string(),
        ]
        .concat();

        let result = import_clippings(&db, &content);
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.total, 2);
    }

    #[test]
    fn test_interleaved_titles_create_one_book_each() {
        let db = Database::open_in_memory().unwrap();
        let titles = ["Book A (A)", "Book B (B)", "Book C (C)"];
        let content: String = (0..50)
            .map(|i| entry(titles[i % 3], (i as u32 + 1) * 100, &format!("passage number {i}")))
            .collect();

        let result = import_clippings(&db, &content);
        assert_eq!(result.imported, 50);
        assert_eq!(db.list_books().unwrap().len(), 3);
    }

    #[test]
    fn test_notes_do_not_count_toward_total() {
        let db = Database::open_in_memory().unwrap();
        let content = [
            entry("Book (Author)", 10, "a highlight"),
            "Book (Author)\n- Your Note on Location 10 | Added on Monday, January 15, 2024 10:30:00 AM\n\na note\n==========\n".to_string(),
        ]
        .concat();

        let result = import_clippings(&db, &content);
        assert_eq!(result.total, 1);
        assert_eq!(result.imported, 1);
    }

    #[test]
    fn test_empty_file_imports_nothing() {
        let db = Database::open_in_memory().unwrap();
        let result = import_clippings(&db, "==========\n==========\n");
        assert_eq!(
            result,
            ImportResult {
                imported: 0,
                skipped: 0,
                total: 0
            }
        );
    }
}
