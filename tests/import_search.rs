//! End-to-end tests: clippings file in, searchable deduplicated store out.

use kindling::{HighlightStore, ImportResult, StoreError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn highlight_entry(title: &str, location: &str, date: &str, body: &str) -> String {
    format!("{title}\n- Your Highlight on {location} | Added on {date}\n\n{body}\n==========\n")
}

fn sample_library() -> String {
    [
        highlight_entry(
            "The Great Gatsby (F. Scott Fitzgerald)",
            "Location 234-256",
            "Monday, January 15, 2024 10:30:00 AM",
            "So we beat on, boats against the current, borne back ceaselessly into the past.",
        ),
        highlight_entry(
            "Walden (Henry David Thoreau)",
            "Page 92",
            "Friday, 26 April 2024 16:02:10",
            "I went to the woods because I wished to live deliberately",
        ),
        highlight_entry(
            "The Great Gatsby (F. Scott Fitzgerald)",
            "Location 400-410",
            "Thursday, August 3, 2023, 9:05 PM",
            "In his blue gardens men and girls came and went like moths",
        ),
        // A note and a bookmark, both discarded by the parser.
        "The Great Gatsby (F. Scott Fitzgerald)\n- Your Note on Location 234 | Added on Monday, January 15, 2024 10:30:00 AM\n\ngreat line\n==========\n".to_string(),
        "Walden (Henry David Thoreau)\n- Your Bookmark on Page 92 | Added on Monday, January 15, 2024 10:30:00 AM\n\n==========\n".to_string(),
    ]
    .concat()
}

#[test]
fn import_builds_deduplicated_library() {
    init_tracing();
    let store = HighlightStore::open_in_memory().unwrap();

    let result = store.import_clippings(&sample_library()).unwrap();
    assert_eq!(
        result,
        ImportResult {
            imported: 3,
            skipped: 0,
            total: 3
        }
    );

    let books = store.books();
    assert_eq!(books.len(), 2);
    let gatsby = books
        .iter()
        .find(|b| b.kindle_title == "The Great Gatsby (F. Scott Fitzgerald)")
        .unwrap();
    assert_eq!(gatsby.highlight_count, 2);

    // Re-importing the identical file changes nothing.
    let again = store.import_clippings(&sample_library()).unwrap();
    assert_eq!(
        again,
        ImportResult {
            imported: 0,
            skipped: 3,
            total: 3
        }
    );
    assert_eq!(store.books().len(), 2);
}

#[test]
fn search_spans_content_and_metadata() {
    let store = HighlightStore::open_in_memory().unwrap();
    store.import_clippings(&sample_library()).unwrap();

    // Indexed path over highlight content, prefix matching.
    let results = store.search("ceasele").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].book_title.as_deref(),
        Some("The Great Gatsby")
    );

    // Metadata fallback: the word appears only in the book title.
    let results = store.search("gatsby").unwrap();
    assert_eq!(results.len(), 2);

    // Ordered newest highlight first across books.
    let results = store.search("the").unwrap();
    assert!(results.len() >= 2);
    for pair in results.windows(2) {
        assert!(pair[0].date_highlighted >= pair[1].date_highlighted);
    }

    // Too short to search.
    assert!(store.search("t").unwrap().is_empty());
}

#[test]
fn favorites_and_tags_address_individual_highlights() {
    let store = HighlightStore::open_in_memory().unwrap();
    store.import_clippings(&sample_library()).unwrap();

    let walden = store
        .books()
        .into_iter()
        .find(|b| b.title == "Walden")
        .unwrap();
    let highlights = store.highlights_for_book(walden.id).unwrap();
    assert_eq!(highlights.len(), 1);
    let highlight = &highlights[0];
    assert_eq!(highlight.location.as_deref(), Some("Page 92"));

    store.toggle_favorite(highlight.id).unwrap();
    let favorites = store.favorite_highlights().unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].id, highlight.id);

    let db = store.database();
    let tag_id = db.create_tag("nature", "#228B22").unwrap();
    db.add_tag_to_highlight(tag_id, highlight.id).unwrap();
    assert_eq!(store.tags_for_highlight(highlight.id).unwrap().len(), 1);
    assert_eq!(db.highlights_for_tag(tag_id).unwrap()[0].id, highlight.id);

    // The favorite flag and tagging never touched the search index.
    assert_eq!(store.search("deliberately").unwrap().len(), 1);
}

#[tokio::test]
async fn debounced_search_last_writer_wins() {
    let store = std::sync::Arc::new(HighlightStore::open_in_memory().unwrap());
    store.import_clippings(&sample_library()).unwrap();

    let stale_store = std::sync::Arc::clone(&store);
    let stale = tokio::spawn(async move { stale_store.search_debounced("woods").await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let fresh = store.search_debounced("moths").await.unwrap();

    assert!(matches!(stale.await.unwrap(), Err(StoreError::Superseded)));
    assert_eq!(fresh.len(), 1);
    assert!(fresh[0].content.contains("moths"));
}

#[test]
fn import_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kindling.db");

    {
        let store = HighlightStore::open(&path).unwrap();
        let result = store.import_clippings(&sample_library()).unwrap();
        assert_eq!(result.imported, 3);
    }

    let store = HighlightStore::open(&path).unwrap();
    assert_eq!(store.books().len(), 2);
    let result = store.import_clippings(&sample_library()).unwrap();
    assert_eq!(result.imported, 0);
    assert_eq!(result.skipped, 3);
}
