//! Chunk persistence and full-text retrieval
//!
//! All chunks of a document are dropped and rebuilt in one
//! transaction; FTS5 rows follow through the triggers so every live
//! chunk has exactly one FTS row with the same rowid.

use super::LibraryDb;
use crate::chunk::ChunkDraft;
use crate::error::Result;
use rusqlite::params;

/// Persisted chunk row
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub document_id: i64,
    pub position: usize,
    pub chunk_type: String,
    pub language: Option<String>,
    pub symbol_name: Option<String>,
    pub symbol_type: Option<String>,
    pub symbol_id: Option<String>,
    pub symbol_part_index: Option<usize>,
    pub symbol_part_count: Option<usize>,
    pub line_start: Option<usize>,
    pub line_end: Option<usize>,
    pub char_start: Option<usize>,
    pub char_end: Option<usize>,
    pub token_count: usize,
    pub chunk_sha: String,
    pub content: String,
    pub context_path: Option<String>,
    pub doc_path: String,
    pub doc_uri: String,
    pub doc_title: String,
}

/// One full-text hit
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub chunk_id: i64,
    pub document_id: i64,
    pub title: String,
    pub path: String,
    pub uri: String,
    pub context: Option<String>,
    pub content: String,
    pub line_start: Option<usize>,
    pub line_end: Option<usize>,
    pub token_count: usize,
    /// `1 / (1 + |bm25|)`, larger is better
    pub score: f64,
}

/// Stable hash binding chunk content to its slot in a document
pub fn chunk_sha(content: &str, position: usize, document_id: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(content.as_bytes());
    hasher.update(position.to_le_bytes().as_slice());
    hasher.update(document_id.to_le_bytes().as_slice());
    hasher.finalize().to_hex()[..32].to_string()
}

/// Whether an error is FTS5 refusing to parse the match expression.
///
/// Query-parse failures surface as a plain `SQLITE_ERROR` with a
/// distinctive message; lock contention, I/O failures, and constraint
/// violations carry other codes and must propagate to the caller.
fn is_fts_query_error(e: &crate::error::DocdexError) -> bool {
    let crate::error::DocdexError::Database(rusqlite::Error::SqliteFailure(err, Some(msg))) = e
    else {
        return false;
    };
    if err.extended_code != rusqlite::ffi::SQLITE_ERROR {
        return false;
    }
    let msg = msg.to_lowercase();
    msg.contains("fts5: syntax error")
        || msg.contains("unknown special query")
        || msg.contains("no such column")
        || msg.contains("unterminated string")
}

/// Reduce a query to letters and digits for the FTS retry path
pub fn normalize_fts_query(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl LibraryDb {
    /// Drop and rebuild all chunks of a document atomically.
    /// Embeddings of the old chunks are removed in the same
    /// transaction so chunks never outlive their vectors or document.
    pub fn replace_document_chunks(
        &self,
        document_id: i64,
        doc_path: &str,
        doc_uri: &str,
        doc_title: &str,
        drafts: &[ChunkDraft],
    ) -> Result<usize> {
        self.conn.execute("BEGIN IMMEDIATE", [])?;
        let result = (|| -> Result<usize> {
            self.delete_chunk_vectors_for_document(document_id)?;
            self.conn.execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![document_id],
            )?;

            let mut stmt = self.conn.prepare(
                "INSERT INTO chunks (document_id, position, chunk_type, language,
                    symbol_name, symbol_type, symbol_id, symbol_part_index, symbol_part_count,
                    line_start, line_end, char_start, char_end,
                    token_count, chunk_sha, content, context_path, doc_path, doc_uri, doc_title)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            )?;

            for (position, draft) in drafts.iter().enumerate() {
                let sha = chunk_sha(&draft.content, position, document_id);
                let symbol = draft.symbol.as_ref();
                stmt.execute(params![
                    document_id,
                    position,
                    draft.chunk_type.as_str(),
                    draft.language,
                    symbol.map(|s| s.name.as_str()),
                    symbol.map(|s| s.symbol_type.as_str()),
                    symbol.map(|s| s.id.as_str()),
                    symbol.and_then(|s| s.part_index),
                    symbol.and_then(|s| s.part_count),
                    draft.line_start,
                    draft.line_end,
                    draft.char_start,
                    draft.char_end,
                    draft.token_count,
                    sha,
                    draft.content,
                    draft.context_path,
                    doc_path,
                    doc_uri,
                    doc_title,
                ])?;
            }
            Ok(drafts.len())
        })();

        match result {
            Ok(n) => {
                self.conn.execute("COMMIT", [])?;
                Ok(n)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Delete all chunks of a document (FTS rows follow via trigger)
    pub fn delete_chunks_for_document(&self, document_id: i64) -> Result<usize> {
        self.delete_chunk_vectors_for_document(document_id)?;
        let rows = self.conn.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id],
        )?;
        Ok(rows)
    }

    /// Get one chunk
    pub fn get_chunk(&self, id: i64) -> Result<Option<ChunkRecord>> {
        let result = self.conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_CHUNK),
            params![id],
            row_to_chunk,
        );
        match result {
            Ok(chunk) => Ok(Some(chunk)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All chunks of a document ordered by position
    pub fn chunks_for_document(&self, document_id: i64) -> Result<Vec<ChunkRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE document_id = ?1 ORDER BY position",
            SELECT_CHUNK
        ))?;
        let chunks = stmt
            .query_map(params![document_id], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    /// Count chunks of active documents
    pub fn count_chunks(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks c JOIN documents d ON d.id = c.document_id WHERE d.active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Full-text search over chunks of active documents.
    ///
    /// The verbatim query runs first; a query the FTS engine refuses
    /// (stray punctuation) is retried in normalized form. Any other
    /// database failure propagates.
    pub fn search_fts(
        &self,
        query: &str,
        limit: usize,
        version_label: Option<&str>,
    ) -> Result<Vec<FtsHit>> {
        match self.search_fts_raw(query, limit, version_label) {
            Ok(hits) => Ok(hits),
            Err(e) if is_fts_query_error(&e) => {
                let normalized = normalize_fts_query(query);
                if normalized.is_empty() {
                    return Ok(Vec::new());
                }
                self.search_fts_raw(&normalized, limit, version_label)
            }
            Err(e) => Err(e),
        }
    }

    fn search_fts_raw(
        &self,
        query: &str,
        limit: usize,
        version_label: Option<&str>,
    ) -> Result<Vec<FtsHit>> {
        let mut sql = String::from(
            "SELECT c.id, c.document_id, c.doc_title, c.doc_path, c.doc_uri, c.context_path,
                    c.content, c.line_start, c.line_end, c.token_count,
                    1.0 / (1.0 + ABS(bm25(chunks_fts, 1.0, 4.0, 2.0, 2.0, 1.0))) AS score
             FROM chunks_fts fts
             JOIN chunks c ON c.id = fts.rowid
             JOIN documents d ON d.id = c.document_id
             WHERE chunks_fts MATCH ?1 AND d.active = 1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(query.to_string())];
        if let Some(version) = version_label {
            sql.push_str(" AND d.version_label = ?2");
            params_vec.push(Box::new(version.to_string()));
        }
        sql.push_str(&format!(" ORDER BY score DESC LIMIT {}", limit.max(1)));

        let mut stmt = self.conn.prepare(&sql)?;
        let hits = stmt
            .query_map(
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
                |row| {
                    Ok(FtsHit {
                        chunk_id: row.get(0)?,
                        document_id: row.get(1)?,
                        title: row.get(2)?,
                        path: row.get(3)?,
                        uri: row.get(4)?,
                        context: row.get(5)?,
                        content: row.get(6)?,
                        line_start: row.get(7)?,
                        line_end: row.get(8)?,
                        token_count: row.get(9)?,
                        score: row.get(10)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }
}

const SELECT_CHUNK: &str = "SELECT id, document_id, position, chunk_type, language,
    symbol_name, symbol_type, symbol_id, symbol_part_index, symbol_part_count,
    line_start, line_end, char_start, char_end,
    token_count, chunk_sha, content, context_path, doc_path, doc_uri, doc_title
    FROM chunks";

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        id: row.get(0)?,
        document_id: row.get(1)?,
        position: row.get(2)?,
        chunk_type: row.get(3)?,
        language: row.get(4)?,
        symbol_name: row.get(5)?,
        symbol_type: row.get(6)?,
        symbol_id: row.get(7)?,
        symbol_part_index: row.get(8)?,
        symbol_part_count: row.get(9)?,
        line_start: row.get(10)?,
        line_end: row.get(11)?,
        char_start: row.get(12)?,
        char_end: row.get(13)?,
        token_count: row.get(14)?,
        chunk_sha: row.get(15)?,
        content: row.get(16)?,
        context_path: row.get(17)?,
        doc_path: row.get(18)?,
        doc_uri: row.get(19)?,
        doc_title: row.get(20)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkDraft;
    use crate::db::DocumentUpsert;

    fn doc_with_chunks(db: &LibraryDb, path: &str, bodies: &[&str]) -> i64 {
        let outcome = db
            .upsert_document(&DocumentUpsert {
                source_id: 1,
                path,
                version_label: "1.x",
                uri: &format!("gh://o/r@1.x/{}", path),
                title: "Guide",
                content: &bodies.join("\n\n"),
                content_type: "markdown",
            })
            .unwrap();
        let drafts: Vec<ChunkDraft> = bodies
            .iter()
            .map(|b| ChunkDraft::doc(format!("Guide\n\n{}", b), Some("Guide".to_string())))
            .collect();
        db.replace_document_chunks(outcome.document_id, path, "uri", "Guide", &drafts)
            .unwrap();
        outcome.document_id
    }

    #[test]
    fn test_fts_row_per_chunk() {
        let db = LibraryDb::open_in_memory().unwrap();
        let doc_id = doc_with_chunks(&db, "docs/a.md", &["alpha body", "beta body"]);

        let chunks = db.chunks_for_document(doc_id).unwrap();
        assert_eq!(chunks.len(), 2);

        for chunk in &chunks {
            let fts_content: String = db
                .conn
                .query_row(
                    "SELECT content FROM chunks_fts WHERE rowid = ?1",
                    params![chunk.id],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(fts_content, chunk.content);
        }
    }

    #[test]
    fn test_positions_unique_and_ordered() {
        let db = LibraryDb::open_in_memory().unwrap();
        let doc_id = doc_with_chunks(&db, "docs/a.md", &["one", "two", "three"]);
        let chunks = db.chunks_for_document(doc_id).unwrap();
        let positions: Vec<usize> = chunks.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_rebuild_drops_old_rows() {
        let db = LibraryDb::open_in_memory().unwrap();
        let doc_id = doc_with_chunks(&db, "docs/a.md", &["old content here"]);
        doc_with_chunks(&db, "docs/a.md", &["new content here"]);

        let chunks = db.chunks_for_document(doc_id).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("new content"));

        let fts_rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM chunks_fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fts_rows, 1);
    }

    #[test]
    fn test_search_fts_scores_and_version_filter() {
        let db = LibraryDb::open_in_memory().unwrap();
        doc_with_chunks(&db, "docs/a.md", &["Hello world from the intro"]);

        let hits = db.search_fts("hello", 8, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);

        let hits = db.search_fts("hello", 8, Some("2.x")).unwrap();
        assert!(hits.is_empty());

        let hits = db.search_fts("hello", 8, Some("1.x")).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_fts_punctuation_retry() {
        let db = LibraryDb::open_in_memory().unwrap();
        doc_with_chunks(&db, "docs/a.md", &["configure the http client"]);

        // FTS5 rejects the colon form; the normalized retry finds it
        let hits = db.search_fts("http: client???", 8, None).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_normalize_fts_query() {
        assert_eq!(normalize_fts_query("foo-bar:baz(1)"), "foo bar baz 1");
        assert_eq!(normalize_fts_query("???"), "");
    }

    fn sqlite_error(extended_code: i32, msg: &str) -> crate::error::DocdexError {
        crate::error::DocdexError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(extended_code),
            Some(msg.to_string()),
        ))
    }

    #[test]
    fn test_fts_query_error_classification() {
        assert!(is_fts_query_error(&sqlite_error(
            rusqlite::ffi::SQLITE_ERROR,
            "fts5: syntax error near \"?\""
        )));
        assert!(is_fts_query_error(&sqlite_error(
            rusqlite::ffi::SQLITE_ERROR,
            "no such column: http"
        )));

        // Transient and integrity failures must propagate, not retry
        assert!(!is_fts_query_error(&sqlite_error(
            rusqlite::ffi::SQLITE_BUSY,
            "database is locked"
        )));
        assert!(!is_fts_query_error(&sqlite_error(
            rusqlite::ffi::SQLITE_IOERR,
            "disk I/O error"
        )));
        assert!(!is_fts_query_error(&sqlite_error(
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            "UNIQUE constraint failed: chunks.document_id, chunks.position"
        )));
        assert!(!is_fts_query_error(&crate::error::DocdexError::Search(
            "unrelated".to_string()
        )));
    }

    #[test]
    fn test_chunk_sha_stable_and_position_sensitive() {
        let a = chunk_sha("content", 0, 1);
        assert_eq!(a, chunk_sha("content", 0, 1));
        assert_ne!(a, chunk_sha("content", 1, 1));
        assert_ne!(a, chunk_sha("content", 0, 2));
        assert_eq!(a.len(), 32);
    }
}
