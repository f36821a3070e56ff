//! Search over a library's chunks
//!
//! Three modes: word (FTS only), vector (embedding only), and hybrid
//! (query expansion + reciprocal-rank fusion + keyword boosts).

mod hybrid;
mod vector;
mod word;

pub use hybrid::{has_strong_signal, hybrid_search, rrf_fuse, RankedList, RRF_K};
pub use vector::vector_search;
pub use word::{relaxed_query, sanitize_word_query, word_search};

use crate::chunk::preview;
use crate::db::chunks::{ChunkRecord, FtsHit};
use crate::db::LibraryDb;
use crate::embed::{Embedder, QueryExpander};
use crate::error::Result;

/// Results returned per query
pub const SEARCH_LIMIT: usize = 8;

/// Search mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    Word,
    Vector,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "word" => Some(Self::Word),
            "vector" => Some(Self::Vector),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// Options for one search call
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub version_label: Option<String>,
    pub limit: usize,
    /// Top score at or above which text retrieval skips expansion
    pub strong_score: f64,
    /// Minimum lead over the runner-up for a strong signal
    pub strong_gap: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            version_label: None,
            limit: SEARCH_LIMIT,
            strong_score: 0.85,
            strong_gap: 0.15,
        }
    }
}

/// One formatted result
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchItem {
    pub chunk_id: i64,
    pub document_id: i64,
    pub title: String,
    pub path: String,
    pub uri: String,
    pub source_name: String,
    pub context_path: Option<String>,
    /// Line range as `start:end`
    pub slice: Option<String>,
    pub preview: String,
    pub token_count: usize,
    pub score: f64,
    /// Score divided by the top score, clamped to [0, 1]
    pub confidence: f64,
}

/// Run a search in the requested mode
pub async fn search(
    db: &LibraryDb,
    source_name: &str,
    query: &str,
    options: &SearchOptions,
    embedder: Option<&dyn Embedder>,
    expander: Option<&dyn QueryExpander>,
) -> Result<Vec<SearchItem>> {
    match options.mode {
        SearchMode::Word => word_search(db, source_name, query, options),
        SearchMode::Vector => vector_search(db, source_name, query, options, embedder).await,
        SearchMode::Hybrid => {
            hybrid_search(db, source_name, query, options, embedder, expander).await
        }
    }
}

pub(crate) fn slice_string(line_start: Option<usize>, line_end: Option<usize>) -> Option<String> {
    match (line_start, line_end) {
        (Some(start), Some(end)) => Some(format!("{}:{}", start, end)),
        _ => None,
    }
}

pub(crate) fn item_from_fts(hit: &FtsHit, source_name: &str, score: f64) -> SearchItem {
    SearchItem {
        chunk_id: hit.chunk_id,
        document_id: hit.document_id,
        title: hit.title.clone(),
        path: hit.path.clone(),
        uri: hit.uri.clone(),
        source_name: source_name.to_string(),
        context_path: hit.context.clone(),
        slice: slice_string(hit.line_start, hit.line_end),
        preview: preview(&hit.content),
        token_count: hit.token_count,
        score,
        confidence: 0.0,
    }
}

pub(crate) fn item_from_chunk(
    chunk: &ChunkRecord,
    source_name: &str,
    score: f64,
) -> SearchItem {
    SearchItem {
        chunk_id: chunk.id,
        document_id: chunk.document_id,
        title: chunk.doc_title.clone(),
        path: chunk.doc_path.clone(),
        uri: chunk.doc_uri.clone(),
        source_name: source_name.to_string(),
        context_path: chunk.context_path.clone(),
        slice: slice_string(chunk.line_start, chunk.line_end),
        preview: preview(&chunk.content),
        token_count: chunk.token_count,
        score,
        confidence: 0.0,
    }
}

/// Fill in confidence as score relative to the top hit
pub(crate) fn apply_confidence(items: &mut [SearchItem]) {
    let top = items.first().map(|i| i.score).unwrap_or(0.0);
    for item in items.iter_mut() {
        item.confidence = if top > 0.0 {
            (item.score / top).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}
