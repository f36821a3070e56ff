//! Vector storage
//!
//! Embeddings live in `vectors_vec`, a table created lazily with the
//! dimensionality of the first embedding seen. Dimensions are fixed
//! for the life of a library DB; changing models requires
//! `clear_embeddings`, which drops the table for rebuild.

use super::LibraryDb;
use crate::error::{DocdexError, Result};
use chrono::Utc;
use rusqlite::params;

/// One nearest-neighbor hit with raw cosine distance
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: i64,
    pub document_id: i64,
    /// Cosine distance, smaller is closer
    pub distance: f64,
}

impl LibraryDb {
    /// Model and dimensionality of this library's vector table
    pub fn vector_meta(&self) -> Result<Option<(String, usize)>> {
        let result = self.conn.query_row(
            "SELECT model, dimensions FROM vector_meta WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)),
        );
        match result {
            Ok((model, dims)) => Ok(Some((model, dims))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                if msg.contains("no such table") =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create the vector table on first embed; reject a dimensionality
    /// change without an intervening `clear_embeddings`.
    pub fn ensure_vector_table(&self, model: &str, dimensions: usize) -> Result<()> {
        if let Some((stored_model, stored_dims)) = self.vector_meta()? {
            if stored_dims != dimensions {
                return Err(DocdexError::Embedding(format!(
                    "vector table is {}-dimensional (model {}); clear embeddings before switching to {} dims",
                    stored_dims, stored_model, dimensions
                )));
            }
            return Ok(());
        }

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vector_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                model TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS vectors_vec (
                chunk_id INTEGER PRIMARY KEY,
                embedding BLOB NOT NULL
            );",
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO vector_meta (id, model, dimensions, created_at) VALUES (1, ?1, ?2, ?3)",
            params![model, dimensions as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Insert or replace the embedding for a chunk
    pub fn upsert_embedding(&self, chunk_id: i64, model: &str, embedding: &[f32]) -> Result<()> {
        self.ensure_vector_table(model, embedding.len())?;
        let bytes = embedding_to_bytes(embedding);
        let now = Utc::now().to_rfc3339();

        self.conn.execute("BEGIN IMMEDIATE", [])?;
        let result = (|| -> Result<()> {
            self.conn.execute(
                "INSERT OR REPLACE INTO chunk_vectors (chunk_id, model, dimensions, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![chunk_id, model, embedding.len() as i64, now],
            )?;
            self.conn.execute(
                "INSERT OR REPLACE INTO vectors_vec (chunk_id, embedding) VALUES (?1, ?2)",
                params![chunk_id, bytes],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    /// Drop all embeddings and the vector table itself so a model
    /// with different dimensions can rebuild it.
    pub fn clear_embeddings(&self) -> Result<()> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS vectors_vec;
             DROP TABLE IF EXISTS vector_meta;
             DELETE FROM chunk_vectors;",
        )?;
        Ok(())
    }

    /// Remove embeddings of one document's chunks (within the
    /// caller's transaction when rebuilding chunks).
    pub(crate) fn delete_chunk_vectors_for_document(&self, document_id: i64) -> Result<()> {
        let has_vec_table: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = 'vectors_vec'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);
        if has_vec_table {
            self.conn.execute(
                "DELETE FROM vectors_vec WHERE chunk_id IN
                 (SELECT id FROM chunks WHERE document_id = ?1)",
                params![document_id],
            )?;
        }
        self.conn.execute(
            "DELETE FROM chunk_vectors WHERE chunk_id IN
             (SELECT id FROM chunks WHERE document_id = ?1)",
            params![document_id],
        )?;
        Ok(())
    }

    /// Chunk ids and contents of active documents still lacking an
    /// embedding under `model`.
    pub fn chunks_needing_embedding(&self, model: &str) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.content FROM chunks c
             JOIN documents d ON d.id = c.document_id AND d.active = 1
             WHERE c.id NOT IN (SELECT chunk_id FROM chunk_vectors WHERE model = ?1)
             ORDER BY c.id",
        )?;
        let rows = stmt
            .query_map(params![model], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count stored embeddings
    pub fn count_embeddings(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunk_vectors", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Nearest chunks to the query vector by cosine distance.
    /// Returns raw distances; callers convert to `1 / (1 + distance)`.
    pub fn search_vectors(
        &self,
        query: &[f32],
        limit: usize,
        version_label: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let meta = match self.vector_meta()? {
            Some(meta) => meta,
            None => return Ok(Vec::new()),
        };
        if query.len() != meta.1 {
            return Err(DocdexError::Embedding(format!(
                "query vector has {} dims, library table has {}",
                query.len(),
                meta.1
            )));
        }

        let mut sql = String::from(
            "SELECT v.chunk_id, c.document_id, v.embedding
             FROM vectors_vec v
             JOIN chunks c ON c.id = v.chunk_id
             JOIN documents d ON d.id = c.document_id
             WHERE d.active = 1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(version) = version_label {
            sql.push_str(" AND d.version_label = ?1");
            params_vec.push(Box::new(version.to_string()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut hits: Vec<VectorHit> = stmt
            .query_map(
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
                |row| {
                    let chunk_id: i64 = row.get(0)?;
                    let document_id: i64 = row.get(1)?;
                    let bytes: Vec<u8> = row.get(2)?;
                    Ok((chunk_id, document_id, bytes))
                },
            )?
            .filter_map(|r| r.ok())
            .map(|(chunk_id, document_id, bytes)| {
                let embedding = bytes_to_embedding(&bytes);
                VectorHit {
                    chunk_id,
                    document_id,
                    distance: cosine_distance(query, &embedding),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Convert f32 embedding to bytes (little-endian)
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes to f32 embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - (dot / (norm_a * norm_b)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkDraft;
    use crate::db::DocumentUpsert;

    fn seed_chunk(db: &LibraryDb) -> i64 {
        let outcome = db
            .upsert_document(&DocumentUpsert {
                source_id: 1,
                path: "docs/a.md",
                version_label: "1.x",
                uri: "gh://o/r@1.x/docs/a.md",
                title: "A",
                content: "body",
                content_type: "markdown",
            })
            .unwrap();
        db.replace_document_chunks(
            outcome.document_id,
            "docs/a.md",
            "uri",
            "A",
            &[ChunkDraft::doc("A\n\nbody".to_string(), None)],
        )
        .unwrap();
        db.chunks_for_document(outcome.document_id).unwrap()[0].id
    }

    #[test]
    fn test_embedding_roundtrip() {
        let original = vec![1.0f32, 2.0, 3.0, -1.5];
        let restored = bytes_to_embedding(&embedding_to_bytes(&original));
        assert_eq!(original, restored);
    }

    #[test]
    fn test_cosine_distance() {
        let a = vec![1.0, 0.0];
        assert!(cosine_distance(&a, &[1.0, 0.0]) < 1e-6);
        assert!((cosine_distance(&a, &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&a, &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_upsert_and_search() {
        let db = LibraryDb::open_in_memory().unwrap();
        let chunk_id = seed_chunk(&db);

        db.upsert_embedding(chunk_id, "test-model", &[1.0, 0.0, 0.0])
            .unwrap();

        let hits = db.search_vectors(&[1.0, 0.0, 0.0], 8, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, chunk_id);
        assert!(hits[0].distance < 1e-6);

        let hits = db.search_vectors(&[1.0, 0.0, 0.0], 8, Some("2.x")).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_dimension_change_requires_clear() {
        let db = LibraryDb::open_in_memory().unwrap();
        let chunk_id = seed_chunk(&db);

        db.upsert_embedding(chunk_id, "model-a", &[1.0, 0.0]).unwrap();
        assert!(db.upsert_embedding(chunk_id, "model-b", &[1.0, 0.0, 0.0]).is_err());

        db.clear_embeddings().unwrap();
        assert_eq!(db.count_embeddings().unwrap(), 0);

        db.upsert_embedding(chunk_id, "model-b", &[1.0, 0.0, 0.0])
            .unwrap();
        let hits = db.search_vectors(&[1.0, 0.0, 0.0], 8, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(db.vector_meta().unwrap().unwrap().1, 3);
    }

    #[test]
    fn test_chunk_rebuild_removes_vectors() {
        let db = LibraryDb::open_in_memory().unwrap();
        let chunk_id = seed_chunk(&db);
        db.upsert_embedding(chunk_id, "m", &[0.5, 0.5]).unwrap();
        assert_eq!(db.count_embeddings().unwrap(), 1);

        let doc_id = db.get_chunk(chunk_id).unwrap().unwrap().document_id;
        db.replace_document_chunks(
            doc_id,
            "docs/a.md",
            "uri",
            "A",
            &[ChunkDraft::doc("A\n\nnew".to_string(), None)],
        )
        .unwrap();

        assert_eq!(db.count_embeddings().unwrap(), 0);
        assert!(db.search_vectors(&[0.5, 0.5], 8, None).unwrap().is_empty());
    }

    #[test]
    fn test_chunks_needing_embedding() {
        let db = LibraryDb::open_in_memory().unwrap();
        let chunk_id = seed_chunk(&db);

        let pending = db.chunks_needing_embedding("m").unwrap();
        assert_eq!(pending.len(), 1);

        db.upsert_embedding(chunk_id, "m", &[1.0]).unwrap();
        assert!(db.chunks_needing_embedding("m").unwrap().is_empty());
    }
}
