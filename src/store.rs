//! HighlightStore - public facade over the database
//!
//! Combines the importer, the search surface, and a cached book listing.
//! Search-as-you-type goes through [`HighlightStore::search_debounced`]:
//! a short wait that a newer query cancels cooperatively, with
//! last-writer-wins on the result via a generation counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::database::{Database, DatabaseError, DatabaseResult};
use crate::importer::import_clippings;
use crate::models::{Book, Highlight, ImportResult, Tag};

/// How long a search waits before executing. A newer query arriving within
/// the window cancels the wait.
const SEARCH_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// The query was cancelled or out-raced by a newer one; the caller
    /// should drop the result and keep the newer query's.
    #[error("search superseded by a newer query")]
    Superseded,
}

/// Thread-safe highlight store with SQLite + FTS5.
///
/// Opening the store is the only fatal failure point; every operation after
/// that degrades per entry (import) or per query (search).
pub struct HighlightStore {
    db: Arc<Database>,
    books: RwLock<Vec<Book>>,
    search_generation: AtomicU64,
    debounce: Mutex<CancellationToken>,
}

impl HighlightStore {
    /// Open or create a store backed by a database file.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_database(Database::open(path)?)
    }

    /// Open a store with an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_database(Database::open_in_memory()?)
    }

    fn from_database(db: Database) -> Result<Self, StoreError> {
        let store = Self {
            db: Arc::new(db),
            books: RwLock::new(Vec::new()),
            search_generation: AtomicU64::new(0),
            debounce: Mutex::new(CancellationToken::new()),
        };
        store.reload_books()?;
        Ok(store)
    }

    /// Direct access to the storage primitives for collaborators
    /// (export, tag UI) that go beyond the facade.
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Import
    // ─────────────────────────────────────────────────────────────────────────

    /// Parse and ingest a whole clippings file, then refresh the cached
    /// book listing so highlight counts reflect the new rows.
    pub fn import_clippings(&self, file_content: &str) -> Result<ImportResult, StoreError> {
        let result = import_clippings(&self.db, file_content);
        self.reload_books()?;
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Books
    // ─────────────────────────────────────────────────────────────────────────

    /// The cached book listing (newest first, with highlight counts).
    pub fn books(&self) -> Vec<Book> {
        self.books.read().clone()
    }

    pub fn reload_books(&self) -> Result<(), StoreError> {
        let fresh = self.db.list_books()?;
        *self.books.write() = fresh;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────────

    /// Synchronous search; see [`Database::search`] for semantics.
    pub fn search(&self, query: &str) -> Result<Vec<Highlight>, StoreError> {
        Ok(self.db.search(query)?)
    }

    /// Debounced search for search-as-you-type.
    ///
    /// Waits [`SEARCH_DEBOUNCE`] before querying; a newer call cancels the
    /// wait and the superseded call returns [`StoreError::Superseded`]. A
    /// query already running against the store completes, but its result is
    /// discarded if a later generation was issued meanwhile.
    pub async fn search_debounced(&self, query: &str) -> Result<Vec<Highlight>, StoreError> {
        let token = {
            let mut current = self.debounce.lock();
            current.cancel();
            let fresh = CancellationToken::new();
            *current = fresh.clone();
            fresh
        };
        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::select! {
            _ = token.cancelled() => {
                debug!(query, "debounce window cancelled");
                return Err(StoreError::Superseded);
            }
            _ = tokio::time::sleep(SEARCH_DEBOUNCE) => {}
        }

        let db = Arc::clone(&self.db);
        let owned_query = query.to_string();
        let handle = tokio::task::spawn_blocking(move || db.search(&owned_query));
        let results = match handle.await {
            Ok(result) => result?,
            Err(_join_error) => return Err(StoreError::Superseded),
        };

        // Last-writer-wins: a later query was issued while this one ran.
        if self.search_generation.load(Ordering::SeqCst) != generation {
            return Err(StoreError::Superseded);
        }
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Highlights
    // ─────────────────────────────────────────────────────────────────────────

    pub fn highlights_for_book(&self, book_id: i64) -> DatabaseResult<Vec<Highlight>> {
        self.db.highlights_for_book(book_id)
    }

    pub fn all_highlights(&self) -> DatabaseResult<Vec<Highlight>> {
        self.db.all_highlights()
    }

    pub fn toggle_favorite(&self, highlight_id: i64) -> DatabaseResult<()> {
        self.db.toggle_favorite(highlight_id)
    }

    pub fn favorite_highlights(&self) -> DatabaseResult<Vec<Highlight>> {
        self.db.favorite_highlights()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tags
    // ─────────────────────────────────────────────────────────────────────────

    pub fn all_tags(&self) -> DatabaseResult<Vec<Tag>> {
        self.db.all_tags()
    }

    pub fn tags_for_highlight(&self, highlight_id: i64) -> DatabaseResult<Vec<Tag>> {
        self.db.tags_for_highlight(highlight_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIPPINGS: &str = "\
The Great Gatsby (F. Scott Fitzgerald)
- Your Highlight on Location 234-256 | Added on Monday, January 15, 2024 10:30:00 AM

So we beat on, boats against the current
==========
The Great Gatsby (F. Scott Fitzgerald)
- Your Highlight on Location 400-410 | Added on Friday, 26 April 2024 16:02:10

In his blue gardens men and girls came and went like moths
==========
Walden (Henry David Thoreau)
- Your Highlight on Page 92 | Added on Monday, January 15, 2024 10:31:00 AM

I went to the woods because I wished to live deliberately
==========
";

    #[test]
    fn test_import_refreshes_book_cache() {
        let store = HighlightStore::open_in_memory().unwrap();
        assert!(store.books().is_empty());

        let result = store.import_clippings(CLIPPINGS).unwrap();
        assert_eq!(result.imported, 3);

        let books = store.books();
        assert_eq!(books.len(), 2);
        let gatsby = books.iter().find(|b| b.title == "The Great Gatsby").unwrap();
        assert_eq!(gatsby.highlight_count, 2);
        assert_eq!(gatsby.author.as_deref(), Some("F. Scott Fitzgerald"));
    }

    #[test]
    fn test_sync_search_both_paths() {
        let store = HighlightStore::open_in_memory().unwrap();
        store.import_clippings(CLIPPINGS).unwrap();

        // Content path.
        let results = store.search("deliberately").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].book_title.as_deref(), Some("Walden"));

        // Metadata path: "gatsby" appears in no highlight text.
        let results = store.search("gatsby").unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_debounced_search_returns_results() {
        let store = HighlightStore::open_in_memory().unwrap();
        store.import_clippings(CLIPPINGS).unwrap();

        let results = store.search_debounced("boats").await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_newer_search_supersedes_older() {
        let store = Arc::new(HighlightStore::open_in_memory().unwrap());
        store.import_clippings(CLIPPINGS).unwrap();

        let first_store = Arc::clone(&store);
        let first = tokio::spawn(async move { first_store.search_debounced("boats").await });

        // Let the first query enter its debounce window, then supersede it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = store.search_debounced("gardens").await;

        assert!(matches!(
            first.await.unwrap(),
            Err(StoreError::Superseded)
        ));
        let results = second.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("gardens"));
    }

    #[tokio::test]
    async fn test_superseded_search_leaves_store_usable() {
        let store = Arc::new(HighlightStore::open_in_memory().unwrap());
        store.import_clippings(CLIPPINGS).unwrap();

        for _ in 0..5 {
            let s = Arc::clone(&store);
            let handle = tokio::spawn(async move { s.search_debounced("woods").await });
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = store.search_debounced("woods").await;
            let _ = handle.await;
        }

        let results = store.search("woods").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_open_on_disk_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("highlights.db");
        {
            let store = HighlightStore::open(&path).unwrap();
            store.import_clippings(CLIPPINGS).unwrap();
        }
        let store = HighlightStore::open(&path).unwrap();
        assert_eq!(store.books().len(), 2);
        assert_eq!(store.search("moths").unwrap().len(), 1);
    }
}
