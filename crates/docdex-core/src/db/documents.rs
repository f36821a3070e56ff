//! Document and blob operations
//!
//! Content is stored once per SHA-256 hash in `document_blobs`;
//! `documents` rows point at a blob and carry the per-version
//! identity `(source_id, path, version_label)`.

use super::{hash_content, LibraryDb};
use crate::error::{DocdexError, Result};
use chrono::Utc;
use rusqlite::params;
use std::collections::HashSet;

/// Largest line span `slice_lines` will return
pub const MAX_SLICE_SPAN: usize = 400;

/// Document record
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub source_id: i64,
    pub path: String,
    pub version_label: String,
    pub uri: String,
    pub title: String,
    pub hash: String,
    pub content_type: String,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

/// Parameters for upserting one document
#[derive(Debug, Clone)]
pub struct DocumentUpsert<'a> {
    pub source_id: i64,
    pub path: &'a str,
    pub version_label: &'a str,
    pub uri: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub content_type: &'a str,
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub document_id: i64,
    /// Content hash differs from the stored row (or the row is new)
    pub changed: bool,
    pub created: bool,
}

impl LibraryDb {
    /// Insert blob if unseen, then insert or update the document row.
    /// Returns whether the content changed so the caller knows to
    /// rebuild chunks.
    pub fn upsert_document(&self, doc: &DocumentUpsert) -> Result<UpsertOutcome> {
        let now = Utc::now().to_rfc3339();
        let hash = hash_content(doc.content);

        self.conn.execute(
            "INSERT OR IGNORE INTO document_blobs (hash, content, created_at) VALUES (?1, ?2, ?3)",
            params![hash, doc.content, now],
        )?;

        let existing: Option<(i64, String)> = match self.conn.query_row(
            "SELECT id, hash FROM documents
             WHERE source_id = ?1 AND path = ?2 AND version_label = ?3",
            params![doc.source_id, doc.path, doc.version_label],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(pair) => Some(pair),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO documents (source_id, path, version_label, uri, title, hash, content_type, active, created_at, modified_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
                    params![doc.source_id, doc.path, doc.version_label, doc.uri, doc.title, hash, doc.content_type, now],
                )?;
                Ok(UpsertOutcome {
                    document_id: self.conn.last_insert_rowid(),
                    changed: true,
                    created: true,
                })
            }
            Some((id, old_hash)) => {
                let changed = old_hash != hash;
                if changed {
                    self.conn.execute(
                        "UPDATE documents SET title = ?2, hash = ?3, uri = ?4, content_type = ?5, active = 1, modified_at = ?6
                         WHERE id = ?1",
                        params![id, doc.title, hash, doc.uri, doc.content_type, now],
                    )?;
                } else {
                    self.conn.execute(
                        "UPDATE documents SET active = 1 WHERE id = ?1",
                        params![id],
                    )?;
                }
                Ok(UpsertOutcome {
                    document_id: id,
                    changed,
                    created: false,
                })
            }
        }
    }

    /// Get document by id
    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let result = self.conn.query_row(
            "SELECT id, source_id, path, version_label, uri, title, hash, content_type, active, created_at, modified_at
             FROM documents WHERE id = ?1",
            params![id],
            row_to_document,
        );
        match result {
            Ok(doc) => Ok(Some(doc)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find active document by path or uri
    pub fn find_document(&self, path_or_uri: &str) -> Result<Option<Document>> {
        let result = self.conn.query_row(
            "SELECT id, source_id, path, version_label, uri, title, hash, content_type, active, created_at, modified_at
             FROM documents WHERE active = 1 AND (path = ?1 OR uri = ?1)
             ORDER BY version_label DESC LIMIT 1",
            params![path_or_uri],
            row_to_document,
        );
        match result {
            Ok(doc) => Ok(Some(doc)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get blob content by hash
    pub fn get_content(&self, hash: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT content FROM document_blobs WHERE hash = ?1",
            params![hash],
            |row| row.get(0),
        );
        match result {
            Ok(content) => Ok(Some(content)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Content of a document by id
    pub fn get_document_content(&self, id: i64) -> Result<String> {
        let doc = self
            .get_document(id)?
            .ok_or_else(|| DocdexError::DocumentNotFound(id.to_string()))?;
        self.get_content(&doc.hash)?
            .ok_or_else(|| DocdexError::DocumentNotFound(format!("blob {}", doc.hash)))
    }

    /// Active document paths for (source, version)
    pub fn active_document_paths(
        &self,
        source_id: i64,
        version_label: &str,
    ) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT path FROM documents WHERE source_id = ?1 AND version_label = ?2 AND active = 1",
        )?;
        let paths = stmt
            .query_map(params![source_id, version_label], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// Deactivate documents of (source, version) whose paths were not
    /// seen this run. Returns how many were deactivated.
    pub fn deactivate_missing(
        &self,
        source_id: i64,
        version_label: &str,
        seen: &HashSet<String>,
    ) -> Result<usize> {
        let mut deactivated = 0;
        for path in self.active_document_paths(source_id, version_label)? {
            if !seen.contains(&path) {
                self.conn.execute(
                    "UPDATE documents SET active = 0
                     WHERE source_id = ?1 AND version_label = ?2 AND path = ?3",
                    params![source_id, version_label, path],
                )?;
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }

    /// Hard-delete inactive documents (their chunks cascade) and
    /// garbage-collect unreferenced blobs. Returns (documents, blobs).
    pub fn cleanup_inactive(&self) -> Result<(usize, usize)> {
        let ids: Vec<i64> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM documents WHERE active = 0")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        for id in &ids {
            self.delete_chunks_for_document(*id)?;
        }
        let docs = self
            .conn
            .execute("DELETE FROM documents WHERE active = 0", [])?;
        let blobs = self.conn.execute(
            "DELETE FROM document_blobs WHERE hash NOT IN (SELECT DISTINCT hash FROM documents)",
            [],
        )?;
        Ok((docs, blobs))
    }

    /// Count documents, optionally only active ones
    pub fn count_documents(&self, active_only: bool) -> Result<usize> {
        let sql = if active_only {
            "SELECT COUNT(*) FROM documents WHERE active = 1"
        } else {
            "SELECT COUNT(*) FROM documents"
        };
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        source_id: row.get(1)?,
        path: row.get(2)?,
        version_label: row.get(3)?,
        uri: row.get(4)?,
        title: row.get(5)?,
        hash: row.get(6)?,
        content_type: row.get(7)?,
        active: row.get::<_, i32>(8)? == 1,
        created_at: row.get(9)?,
        modified_at: row.get(10)?,
    })
}

/// Return lines `start..=end` (1-indexed, inclusive) of `content`.
///
/// Errors when the range is inverted, starts at zero, or spans
/// `MAX_SLICE_SPAN` lines or more. An end past the last line is
/// clamped.
pub fn slice_lines(content: &str, start: usize, end: usize) -> Result<String> {
    if start == 0 {
        return Err(DocdexError::InvalidSlice("line numbers start at 1".into()));
    }
    if end < start {
        return Err(DocdexError::InvalidSlice(format!(
            "end {} before start {}",
            end, start
        )));
    }
    let span = end - start + 1;
    if span >= MAX_SLICE_SPAN {
        return Err(DocdexError::InvalidSlice(format!(
            "span {} exceeds the {}-line limit",
            span, MAX_SLICE_SPAN
        )));
    }

    let lines: Vec<&str> = content.lines().collect();
    if start > lines.len() {
        return Err(DocdexError::InvalidSlice(format!(
            "start {} past end of document ({} lines)",
            start,
            lines.len()
        )));
    }
    let end = end.min(lines.len());
    Ok(lines[start - 1..end].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(db: &LibraryDb, path: &str, content: &str) -> UpsertOutcome {
        db.upsert_document(&DocumentUpsert {
            source_id: 1,
            path,
            version_label: "1.x",
            uri: &format!("gh://o/r@1.x/{}", path),
            title: "Title",
            content,
            content_type: "markdown",
        })
        .unwrap()
    }

    #[test]
    fn test_upsert_insert_update_unchanged() {
        let db = LibraryDb::open_in_memory().unwrap();

        let first = upsert(&db, "docs/a.md", "# A\n\nbody");
        assert!(first.created);
        assert!(first.changed);

        let second = upsert(&db, "docs/a.md", "# A\n\nbody");
        assert!(!second.created);
        assert!(!second.changed);
        assert_eq!(second.document_id, first.document_id);

        let third = upsert(&db, "docs/a.md", "# A\n\nnew body");
        assert!(third.changed);
        assert_eq!(third.document_id, first.document_id);
    }

    #[test]
    fn test_blob_shared_between_documents() {
        let db = LibraryDb::open_in_memory().unwrap();
        upsert(&db, "docs/a.md", "same");
        upsert(&db, "docs/b.md", "same");

        let blobs: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM document_blobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(blobs, 1);
    }

    #[test]
    fn test_document_hash_matches_blob() {
        let db = LibraryDb::open_in_memory().unwrap();
        let outcome = upsert(&db, "docs/a.md", "hello");
        let doc = db.get_document(outcome.document_id).unwrap().unwrap();
        assert_eq!(doc.hash, hash_content("hello"));
        assert_eq!(db.get_content(&doc.hash).unwrap().unwrap(), "hello");
    }

    #[test]
    fn test_deactivate_missing() {
        let db = LibraryDb::open_in_memory().unwrap();
        upsert(&db, "docs/a.md", "a");
        upsert(&db, "docs/b.md", "b");
        upsert(&db, "docs/c.md", "c");

        let seen: HashSet<String> = ["docs/a.md".to_string(), "docs/c.md".to_string()]
            .into_iter()
            .collect();
        let gone = db.deactivate_missing(1, "1.x", &seen).unwrap();
        assert_eq!(gone, 1);

        let active = db.active_document_paths(1, "1.x").unwrap();
        assert_eq!(active.len(), 2);
        assert!(!active.contains(&"docs/b.md".to_string()));

        // Re-upsert reactivates
        upsert(&db, "docs/b.md", "b");
        assert_eq!(db.active_document_paths(1, "1.x").unwrap().len(), 3);
    }

    #[test]
    fn test_cleanup_inactive_collects_blobs() {
        let db = LibraryDb::open_in_memory().unwrap();
        upsert(&db, "docs/a.md", "only-here");
        db.deactivate_missing(1, "1.x", &HashSet::new()).unwrap();

        let (docs, blobs) = db.cleanup_inactive().unwrap();
        assert_eq!(docs, 1);
        assert_eq!(blobs, 1);
    }

    #[test]
    fn test_slice_lines_contract() {
        let content = "line1\nline2\nline3\nline4";
        assert_eq!(slice_lines(content, 2, 3).unwrap(), "line2\nline3");
        assert!(slice_lines(content, 3, 2).is_err());
        assert!(slice_lines(content, 1, 500).is_err());
        assert!(slice_lines(content, 0, 2).is_err());
        // End clamped to EOF when the span is legal
        assert_eq!(slice_lines(content, 3, 10).unwrap(), "line3\nline4");
    }
}
