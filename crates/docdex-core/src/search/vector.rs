//! Vector mode: embedding similarity over the library's vector table

use super::{apply_confidence, item_from_chunk, SearchItem, SearchOptions};
use crate::db::LibraryDb;
use crate::embed::{Embedder, QUERY_TASK_PREFIX};
use crate::error::{DocdexError, Result};

/// Run vector-mode search. Reports "not ready" when no embedder is
/// configured or the query cannot be embedded.
pub async fn vector_search(
    db: &LibraryDb,
    source_name: &str,
    query: &str,
    options: &SearchOptions,
    embedder: Option<&dyn Embedder>,
) -> Result<Vec<SearchItem>> {
    let embedder = embedder.ok_or_else(not_ready)?;
    let vector = embedder
        .embed(&format!("{}{}", QUERY_TASK_PREFIX, query))
        .await
        .map_err(|_| not_ready())?;

    let hits = db.search_vectors(&vector, options.limit, options.version_label.as_deref())?;
    let mut items = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(chunk) = db.get_chunk(hit.chunk_id)? else {
            continue;
        };
        let similarity = 1.0 / (1.0 + hit.distance);
        items.push(item_from_chunk(&chunk, source_name, similarity));
    }
    apply_confidence(&mut items);
    Ok(items)
}

fn not_ready() -> DocdexError {
    DocdexError::Search("vector search not ready; configure models.embed and run embed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkDraft;
    use crate::db::DocumentUpsert;
    use async_trait::async_trait;

    pub(crate) struct FakeEmbedder {
        pub vector: Vec<f32>,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }

        fn dimensions(&self) -> Option<usize> {
            Some(self.vector.len())
        }

        fn model_name(&self) -> &str {
            "fake"
        }
    }

    fn seed_chunk(db: &LibraryDb, path: &str, body: &str) -> i64 {
        let outcome = db
            .upsert_document(&DocumentUpsert {
                source_id: 1,
                path,
                version_label: "1.x",
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
        db.chunks_for_document(outcome.document_id).unwrap()[0].id
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_similarity() {
        let db = LibraryDb::open_in_memory().unwrap();
        let near = seed_chunk(&db, "near.md", "near content");
        let far = seed_chunk(&db, "far.md", "far content");
        db.upsert_embedding(near, "m", &[1.0, 0.0]).unwrap();
        db.upsert_embedding(far, "m", &[0.0, 1.0]).unwrap();

        let embedder = FakeEmbedder {
            vector: vec![1.0, 0.0],
        };
        let items = vector_search(
            &db,
            "demo",
            "anything",
            &SearchOptions::default(),
            Some(&embedder),
        )
        .await
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].path, "near.md");
        assert!(items[0].score > items[1].score);
        assert_eq!(items[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn test_vector_search_not_ready_without_embedder() {
        let db = LibraryDb::open_in_memory().unwrap();
        let err = vector_search(&db, "demo", "q", &SearchOptions::default(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }
}
