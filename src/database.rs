//! SQLite storage layer
//!
//! Owns the schema: books, highlights, tags, the highlight/tag join table,
//! and an external-content FTS5 index over highlight text. The index is
//! maintained by AFTER INSERT/UPDATE/DELETE triggers, so it mutates inside
//! the same transaction as the row it shadows and can never diverge.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Book, Highlight, Tag};
use crate::query::{fts_match_expression, like_pattern, MIN_QUERY_LEN};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Outcome of a conditional highlight insert. A per-entry storage failure is
/// the `Err` side of `DatabaseResult<InsertOutcome>`, so callers fold over
/// three cases: created, duplicate, failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(i64),
    Duplicate,
}

/// Parse a timestamp string from the database to DateTime<Utc>
fn parse_db_timestamp(timestamp_str: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(|_| Utc::now())
}

fn format_db_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Thread-safe database wrapper. All writes serialize through the one
/// connection behind the mutex; the `kindle_title` and `content_hash`
/// UNIQUE constraints are the real duplicate guards either way.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.setup_schema()?;
        Ok(db)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author TEXT,
                kindle_title TEXT NOT NULL UNIQUE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS highlights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_id INTEGER NOT NULL REFERENCES books(id),
                content TEXT NOT NULL,
                location TEXT,
                date_highlighted DATETIME,
                date_imported DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                content_hash TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                color TEXT NOT NULL DEFAULT '#808080'
            );

            CREATE TABLE IF NOT EXISTS highlight_tags (
                highlight_id INTEGER NOT NULL REFERENCES highlights(id),
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                PRIMARY KEY (highlight_id, tag_id)
            );

            CREATE INDEX IF NOT EXISTS idx_highlights_book_id ON highlights(book_id);
            CREATE INDEX IF NOT EXISTS idx_highlights_is_favorite ON highlights(is_favorite);
            CREATE INDEX IF NOT EXISTS idx_highlight_tags_tag_id ON highlight_tags(tag_id);

            CREATE VIRTUAL TABLE IF NOT EXISTS highlights_fts USING fts5(
                content,
                content='highlights',
                content_rowid='id'
            );

            CREATE TRIGGER IF NOT EXISTS highlights_ai AFTER INSERT ON highlights BEGIN
                INSERT INTO highlights_fts(rowid, content) VALUES (new.id, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS highlights_ad AFTER DELETE ON highlights BEGIN
                INSERT INTO highlights_fts(highlights_fts, rowid, content)
                VALUES ('delete', old.id, old.content);
            END;

            CREATE TRIGGER IF NOT EXISTS highlights_au AFTER UPDATE ON highlights BEGIN
                INSERT INTO highlights_fts(highlights_fts, rowid, content)
                VALUES ('delete', old.id, old.content);
                INSERT INTO highlights_fts(rowid, content) VALUES (new.id, new.content);
            END;
            "#,
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Books
    // ─────────────────────────────────────────────────────────────────────────

    /// Look up a book by its verbatim Kindle title line, creating it on miss.
    ///
    /// The insert tolerates a concurrent creator: on conflict it is a no-op
    /// and the follow-up lookup returns the winner's row.
    pub fn find_or_create_book(
        &self,
        title: &str,
        author: Option<&str>,
        kindle_title: &str,
    ) -> DatabaseResult<i64> {
        let conn = self.conn.lock();

        if let Some(id) = Self::book_id_for_kindle_title(&conn, kindle_title)? {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO books (title, author, kindle_title) VALUES (?1, ?2, ?3)
             ON CONFLICT(kindle_title) DO NOTHING",
            params![title, author, kindle_title],
        )?;

        let id = conn.query_row(
            "SELECT id FROM books WHERE kindle_title = ?1",
            [kindle_title],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn book_id_for_kindle_title(
        conn: &Connection,
        kindle_title: &str,
    ) -> DatabaseResult<Option<i64>> {
        let id = conn
            .query_row(
                "SELECT id FROM books WHERE kindle_title = ?1",
                [kindle_title],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// All books with their highlight counts, newest first.
    pub fn list_books(&self) -> DatabaseResult<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT b.id, b.title, b.author, b.kindle_title, b.created_at, COUNT(h.id)
            FROM books b
            LEFT JOIN highlights h ON h.book_id = b.id
            GROUP BY b.id
            ORDER BY b.created_at DESC
            "#,
        )?;
        let books = stmt
            .query_map([], Self::row_to_book)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }

    pub fn get_book(&self, id: i64) -> DatabaseResult<Option<Book>> {
        let conn = self.conn.lock();
        let book = conn
            .query_row(
                r#"
                SELECT b.id, b.title, b.author, b.kindle_title, b.created_at, COUNT(h.id)
                FROM books b
                LEFT JOIN highlights h ON h.book_id = b.id
                WHERE b.id = ?1
                GROUP BY b.id
                "#,
                [id],
                Self::row_to_book,
            )
            .optional()?;
        Ok(book)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Highlights
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a highlight unless one with the same content hash exists
    /// anywhere in the store. The FTS index row is written by trigger inside
    /// the same statement's transaction.
    pub fn insert_highlight_if_absent(
        &self,
        book_id: i64,
        content: &str,
        location: Option<&str>,
        date_highlighted: Option<DateTime<Utc>>,
        content_hash: &str,
    ) -> DatabaseResult<InsertOutcome> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            r#"
            INSERT INTO highlights (book_id, content, location, date_highlighted, date_imported, content_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
            params![
                book_id,
                content,
                location,
                date_highlighted.map(format_db_timestamp),
                format_db_timestamp(Utc::now()),
                content_hash,
            ],
        )?;

        if changed == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Created(conn.last_insert_rowid()))
        }
    }

    /// Highlights for one book, most recently highlighted first.
    pub fn highlights_for_book(&self, book_id: i64) -> DatabaseResult<Vec<Highlight>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT h.id, h.book_id, h.content, h.location, h.date_highlighted,
                   h.date_imported, h.is_favorite, h.content_hash, b.title, b.author
            FROM highlights h
            JOIN books b ON h.book_id = b.id
            WHERE h.book_id = ?1
            ORDER BY h.date_highlighted DESC
            "#,
        )?;
        let highlights = stmt
            .query_map([book_id], Self::row_to_highlight)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(highlights)
    }

    /// Every highlight in the store, annotated with its book, most recently
    /// highlighted first.
    pub fn all_highlights(&self) -> DatabaseResult<Vec<Highlight>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT h.id, h.book_id, h.content, h.location, h.date_highlighted,
                   h.date_imported, h.is_favorite, h.content_hash, b.title, b.author
            FROM highlights h
            JOIN books b ON h.book_id = b.id
            ORDER BY h.date_highlighted DESC
            "#,
        )?;
        let highlights = stmt
            .query_map([], Self::row_to_highlight)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(highlights)
    }

    /// Flip the favorite flag. The FTS update trigger re-indexes the row
    /// with unchanged content, keeping index and table in lockstep.
    pub fn toggle_favorite(&self, highlight_id: i64) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE highlights SET is_favorite = NOT is_favorite WHERE id = ?1",
            [highlight_id],
        )?;
        Ok(())
    }

    pub fn favorite_highlights(&self) -> DatabaseResult<Vec<Highlight>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT h.id, h.book_id, h.content, h.location, h.date_highlighted,
                   h.date_imported, h.is_favorite, h.content_hash, b.title, b.author
            FROM highlights h
            JOIN books b ON h.book_id = b.id
            WHERE h.is_favorite = 1
            ORDER BY h.date_highlighted DESC
            "#,
        )?;
        let highlights = stmt
            .query_map([], Self::row_to_highlight)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(highlights)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────────

    /// Full-text search over highlight content, unioned with a
    /// case-insensitive substring match on book title/author. Results are
    /// deduplicated by the UNION and ordered newest-highlight first.
    ///
    /// Queries shorter than two characters return nothing; sanitization
    /// guarantees the MATCH expression cannot raise, so search degrades to
    /// fewer results instead of erroring on odd input.
    pub fn search(&self, raw_query: &str) -> DatabaseResult<Vec<Highlight>> {
        if raw_query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }

        let match_expr = fts_match_expression(raw_query);
        let like = like_pattern(raw_query);

        let conn = self.conn.lock();
        match Self::run_union_search(&conn, &match_expr, &like) {
            Ok(highlights) => Ok(highlights),
            // Sanitization leaves a few characters (e.g. '%', '\') that FTS5
            // rejects as bareword syntax. A malformed MATCH means zero
            // indexed-path matches, so fall back to the metadata arm alone.
            Err(rusqlite::Error::SqliteFailure(..)) => {
                Ok(Self::run_metadata_search(&conn, &like)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn run_union_search(
        conn: &Connection,
        match_expr: &str,
        like: &str,
    ) -> rusqlite::Result<Vec<Highlight>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT h.id, h.book_id, h.content, h.location, h.date_highlighted,
                   h.date_imported, h.is_favorite, h.content_hash, b.title, b.author
            FROM highlights h
            JOIN books b ON h.book_id = b.id
            WHERE h.id IN (SELECT rowid FROM highlights_fts WHERE highlights_fts MATCH ?1)
            UNION
            SELECT h.id, h.book_id, h.content, h.location, h.date_highlighted,
                   h.date_imported, h.is_favorite, h.content_hash, b.title, b.author
            FROM highlights h
            JOIN books b ON h.book_id = b.id
            WHERE b.title LIKE ?2 ESCAPE '\' OR b.author LIKE ?2 ESCAPE '\'
            ORDER BY date_highlighted DESC
            "#,
        )?;
        let highlights = stmt
            .query_map(params![match_expr, like], Self::row_to_highlight)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(highlights)
    }

    fn run_metadata_search(conn: &Connection, like: &str) -> rusqlite::Result<Vec<Highlight>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT h.id, h.book_id, h.content, h.location, h.date_highlighted,
                   h.date_imported, h.is_favorite, h.content_hash, b.title, b.author
            FROM highlights h
            JOIN books b ON h.book_id = b.id
            WHERE b.title LIKE ?1 ESCAPE '\' OR b.author LIKE ?1 ESCAPE '\'
            ORDER BY date_highlighted DESC
            "#,
        )?;
        let highlights = stmt
            .query_map([like], Self::row_to_highlight)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(highlights)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tags
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_tag(&self, name: &str, color: &str) -> DatabaseResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tags (name, color) VALUES (?1, ?2)",
            params![name, color],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_tag(&self, id: i64, name: &str, color: &str) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE tags SET name = ?1, color = ?2 WHERE id = ?3",
            params![name, color, id],
        )?;
        Ok(())
    }

    /// Delete a tag and its join rows.
    pub fn delete_tag(&self, id: i64) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM highlight_tags WHERE tag_id = ?1", [id])?;
        conn.execute("DELETE FROM tags WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn all_tags(&self) -> DatabaseResult<Vec<Tag>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, name, color FROM tags ORDER BY name")?;
        let tags = stmt
            .query_map([], Self::row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Attach a tag to a highlight; attaching twice is a no-op.
    pub fn add_tag_to_highlight(&self, tag_id: i64, highlight_id: i64) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO highlight_tags (highlight_id, tag_id) VALUES (?1, ?2)",
            params![highlight_id, tag_id],
        )?;
        Ok(())
    }

    pub fn remove_tag_from_highlight(&self, tag_id: i64, highlight_id: i64) -> DatabaseResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM highlight_tags WHERE highlight_id = ?1 AND tag_id = ?2",
            params![highlight_id, tag_id],
        )?;
        Ok(())
    }

    pub fn tags_for_highlight(&self, highlight_id: i64) -> DatabaseResult<Vec<Tag>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT t.id, t.name, t.color
            FROM tags t
            JOIN highlight_tags ht ON ht.tag_id = t.id
            WHERE ht.highlight_id = ?1
            ORDER BY t.name
            "#,
        )?;
        let tags = stmt
            .query_map([highlight_id], Self::row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    pub fn highlights_for_tag(&self, tag_id: i64) -> DatabaseResult<Vec<Highlight>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT h.id, h.book_id, h.content, h.location, h.date_highlighted,
                   h.date_imported, h.is_favorite, h.content_hash, b.title, b.author
            FROM highlights h
            JOIN highlight_tags ht ON ht.highlight_id = h.id
            JOIN books b ON h.book_id = b.id
            WHERE ht.tag_id = ?1
            ORDER BY h.date_highlighted DESC
            "#,
        )?;
        let highlights = stmt
            .query_map([tag_id], Self::row_to_highlight)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(highlights)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Row mapping
    // ─────────────────────────────────────────────────────────────────────────

    fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
        let created_at: String = row.get(4)?;
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            kindle_title: row.get(3)?,
            created_at: parse_db_timestamp(&created_at),
            highlight_count: row.get(5)?,
        })
    }

    fn row_to_highlight(row: &rusqlite::Row) -> rusqlite::Result<Highlight> {
        let date_highlighted: Option<String> = row.get(4)?;
        let date_imported: String = row.get(5)?;
        let is_favorite: i64 = row.get(6)?;
        Ok(Highlight {
            id: row.get(0)?,
            book_id: row.get(1)?,
            content: row.get(2)?,
            location: row.get(3)?,
            date_highlighted: date_highlighted.as_deref().map(parse_db_timestamp),
            date_imported: parse_db_timestamp(&date_imported),
            is_favorite: is_favorite != 0,
            content_hash: row.get(7)?,
            book_title: row.get(8)?,
            book_author: row.get(9)?,
        })
    }

    fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
        })
    }
}
