//! Cross-module pipeline tests: document upsert through chunking to
//! search, plus queue resumability and re-ingest idempotence.

use std::collections::HashSet;
use std::sync::Mutex;

use docdex_core::chunk::build_document_chunks;
use docdex_core::db::{CrawlStatus, DocumentUpsert, LibraryDb};
use docdex_core::search::{search, SearchMode, SearchOptions};

fn index_file(db: &LibraryDb, path: &str, version: &str, content: &str) -> i64 {
    let title = content
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .unwrap_or(path)
        .to_string();
    let uri = format!("gh://demo/repo@{}/{}", version, path);
    let outcome = db
        .upsert_document(&DocumentUpsert {
            source_id: 1,
            path,
            version_label: version,
            uri: &uri,
            title: &title,
            content,
            content_type: "markdown",
        })
        .unwrap();
    if outcome.changed {
        let drafts = build_document_chunks(content, path, &title);
        db.replace_document_chunks(outcome.document_id, path, &uri, &title, &drafts)
            .unwrap();
    }
    outcome.document_id
}

#[tokio::test]
async fn word_search_scoped_to_version_returns_exact_document() {
    let db = LibraryDb::open_in_memory().unwrap();
    index_file(&db, "intro.md", "1.x", "# Intro\n\nHello world");
    index_file(&db, "next.md", "2.x", "# Next\n\nNext release notes");

    let options = SearchOptions {
        mode: SearchMode::Word,
        version_label: Some("1.x".to_string()),
        ..Default::default()
    };
    let items = search(&db, "demo/repo", "Hello", &options, None, None)
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].path, "intro.md");
    assert_eq!(items[0].title, "Intro");
    assert_eq!(items[0].source_name, "demo/repo");
}

#[test]
fn reingest_without_change_touches_nothing() {
    let db = LibraryDb::open_in_memory().unwrap();
    let content = "# Guide\n\nSome body with enough words to chunk.";
    let doc_id = index_file(&db, "guide.md", "1.x", content);
    let before: Vec<String> = db
        .chunks_for_document(doc_id)
        .unwrap()
        .iter()
        .map(|c| c.chunk_sha.clone())
        .collect();

    // Second pass with identical content reports unchanged and leaves
    // the chunk rows alone.
    let outcome = db
        .upsert_document(&DocumentUpsert {
            source_id: 1,
            path: "guide.md",
            version_label: "1.x",
            uri: "gh://demo/repo@1.x/guide.md",
            title: "Guide",
            content,
            content_type: "markdown",
        })
        .unwrap();
    assert!(!outcome.changed);
    assert!(!outcome.created);

    let after: Vec<String> = db
        .chunks_for_document(doc_id)
        .unwrap()
        .iter()
        .map(|c| c.chunk_sha.clone())
        .collect();
    assert_eq!(before, after);
}

#[test]
fn active_set_tracks_latest_sync() {
    let db = LibraryDb::open_in_memory().unwrap();
    index_file(&db, "docs/a.md", "1.x", "# A\n\nalpha");
    index_file(&db, "docs/b.md", "1.x", "# B\n\nbeta");

    // Next sync only sees a.md
    let seen: HashSet<String> = ["docs/a.md".to_string()].into_iter().collect();
    db.deactivate_missing(1, "1.x", &seen).unwrap();

    let active = db.active_document_paths(1, "1.x").unwrap();
    assert_eq!(active, vec!["docs/a.md".to_string()]);

    // Deactivated documents disappear from search
    let hits = db.search_fts("beta", 8, None).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn chunk_invariants_hold_for_mixed_content() {
    let db = LibraryDb::open_in_memory().unwrap();

    let markdown = format!(
        "# Reference\n\n## Install\n\n{}\n\n## Usage\n\n{}\n",
        "Install instructions with plenty of words. ".repeat(40),
        "Usage notes that also run long enough to matter. ".repeat(40),
    );
    let doc_id = index_file(&db, "docs/ref.md", "1.x", &markdown);

    let chunks = db.chunks_for_document(doc_id).unwrap();
    assert!(!chunks.is_empty());

    let mut positions = HashSet::new();
    for chunk in &chunks {
        // Positions are unique per document
        assert!(positions.insert(chunk.position));
        // Token counts stay under the hard ceiling
        assert!(chunk.token_count <= 1000);
        // Line ranges are ordered when present
        if let (Some(start), Some(end)) = (chunk.line_start, chunk.line_end) {
            assert!(start <= end);
        }
    }

    // Both leaf sections are reachable through the text index
    let install = db.search_fts("install instructions", 8, None).unwrap();
    assert!(!install.is_empty());
    let usage = db.search_fts("usage notes", 8, None).unwrap();
    assert!(!usage.is_empty());
    assert_ne!(install[0].chunk_id, usage[0].chunk_id);
}

#[test]
fn crawl_queue_resumes_after_done_rows_reset() {
    let db = LibraryDb::open_in_memory().unwrap();
    for i in 0..5 {
        let url = format!("https://hono.dev/docs/guides/{}", i);
        db.enqueue_page(1, &url, &url, 1).unwrap();
    }

    // First run: two pages complete, three fail mid-flight
    let mut handled = 0;
    while let Some(page) = db.claim_next_page(1).unwrap() {
        if handled < 2 {
            db.mark_page(page.id, CrawlStatus::Done, None).unwrap();
        } else {
            db.mark_page(page.id, CrawlStatus::Failed, Some("timeout"))
                .unwrap();
        }
        handled += 1;
    }
    let counts = db.crawl_counts(1).unwrap();
    assert_eq!((counts.done, counts.failed), (2, 3));

    // Restart without force: failed pages come back, done pages stay
    db.requeue_incomplete(1).unwrap();
    let mut reprocessed = 0;
    while let Some(page) = db.claim_next_page(1).unwrap() {
        db.mark_page(page.id, CrawlStatus::Done, None).unwrap();
        reprocessed += 1;
    }
    assert_eq!(reprocessed, 3);

    let counts = db.crawl_counts(1).unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.done, 5);
    assert_eq!(counts.total(), 5);
}

#[tokio::test]
async fn hybrid_search_merges_code_and_doc_chunks() {
    let db = LibraryDb::open_in_memory().unwrap();
    index_file(
        &db,
        "docs/middleware.md",
        "1.x",
        "# Middleware\n\nMiddleware wraps request handling.",
    );

    // A code file through the real chunker
    let code = "fn apply_middleware() {\n    // wraps the handler\n}\n";
    let title = "middleware.rs";
    let uri = "gh://demo/repo@1.x/src/middleware.rs";
    let outcome = db
        .upsert_document(&DocumentUpsert {
            source_id: 1,
            path: "src/middleware.rs",
            version_label: "1.x",
            uri,
            title,
            content: code,
            content_type: "code",
        })
        .unwrap();
    let drafts = build_document_chunks(code, "src/middleware.rs", title);
    db.replace_document_chunks(outcome.document_id, "src/middleware.rs", uri, title, &drafts)
        .unwrap();

    let items = search(
        &db,
        "demo/repo",
        "middleware",
        &SearchOptions::default(),
        None,
        None,
    )
    .await
    .unwrap();

    assert!(items.len() >= 2);
    let paths: HashSet<&str> = items.iter().map(|i| i.path.as_str()).collect();
    assert!(paths.contains("docs/middleware.md"));
    assert!(paths.contains("src/middleware.rs"));
    assert_eq!(items[0].confidence, 1.0);
    assert!(items.iter().all(|i| i.confidence <= 1.0));
}

// Shared mutable access pattern used by the crawler and ingest
#[test]
fn library_db_is_send_behind_mutex() {
    fn assert_send<T: Send>() {}
    assert_send::<Mutex<LibraryDb>>();
}
