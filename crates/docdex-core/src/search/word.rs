//! Word mode: FTS5 retrieval with a sanitized AND query

use super::{apply_confidence, item_from_fts, SearchItem, SearchOptions};
use crate::db::LibraryDb;
use crate::error::Result;

/// Join query tokens into an explicit AND match expression
pub fn sanitize_word_query(query: &str) -> String {
    tokens(query)
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Per-token prefix matches, OR'd: the relaxed fallback when the
/// strict query returns nothing
pub fn relaxed_query(query: &str) -> String {
    tokens(query)
        .map(|t| format!("\"{}\"*", t))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn tokens(query: &str) -> impl Iterator<Item = String> + '_ {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

/// Run word-mode search
pub fn word_search(
    db: &LibraryDb,
    source_name: &str,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<SearchItem>> {
    let sanitized = sanitize_word_query(query);
    if sanitized.is_empty() {
        return Ok(Vec::new());
    }
    let hits = db.search_fts(&sanitized, options.limit, options.version_label.as_deref())?;
    let mut items: Vec<SearchItem> = hits
        .iter()
        .map(|hit| item_from_fts(hit, source_name, hit.score))
        .collect();
    apply_confidence(&mut items);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkDraft;
    use crate::db::DocumentUpsert;

    #[test]
    fn test_sanitize_word_query() {
        assert_eq!(sanitize_word_query("hello world"), "\"hello\" AND \"world\"");
        assert_eq!(sanitize_word_query("c++ lambda!"), "\"c\" AND \"lambda\"");
        assert_eq!(sanitize_word_query("..."), "");
    }

    #[test]
    fn test_relaxed_query() {
        assert_eq!(relaxed_query("hello wor"), "\"hello\"* OR \"wor\"*");
    }

    fn seed(db: &LibraryDb, path: &str, version: &str, body: &str) {
        let outcome = db
            .upsert_document(&DocumentUpsert {
                source_id: 1,
                path,
                version_label: version,
                uri: path,
                title: path,
                content: body,
                content_type: "markdown",
            })
            .unwrap();
        db.replace_document_chunks(
            outcome.document_id,
            path,
            path,
            path,
            &[ChunkDraft::doc(body.to_string(), None)],
        )
        .unwrap();
    }

    #[test]
    fn test_word_search_version_scoped() {
        let db = LibraryDb::open_in_memory().unwrap();
        seed(&db, "intro.md", "1.x", "Intro\n\nHello world");
        seed(&db, "next.md", "2.x", "Next\n\nNext release notes");

        let options = SearchOptions {
            version_label: Some("1.x".to_string()),
            ..Default::default()
        };
        let items = word_search(&db, "demo/repo", "Hello", &options).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "intro.md");
        assert_eq!(items[0].confidence, 1.0);

        // The other version's document is invisible to this scope
        let items = word_search(&db, "demo/repo", "Next", &options).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_word_search_requires_all_tokens() {
        let db = LibraryDb::open_in_memory().unwrap();
        seed(&db, "a.md", "1.x", "routing middleware guide");
        seed(&db, "b.md", "1.x", "routing only here");

        let items = word_search(
            &db,
            "demo/repo",
            "routing middleware",
            &SearchOptions::default(),
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "a.md");
    }
}
