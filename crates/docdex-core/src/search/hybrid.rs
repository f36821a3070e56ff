//! Hybrid mode: reciprocal-rank fusion of text and vector retrieval
//! with query expansion and keyword boosts

use super::{
    apply_confidence, item_from_chunk, item_from_fts, relaxed_query, sanitize_word_query,
    SearchItem, SearchOptions,
};
use crate::db::LibraryDb;
use crate::embed::{Embedder, QueryExpander, QUERY_TASK_PREFIX};
use crate::error::Result;
use std::collections::HashMap;
use tracing::debug;

/// RRF constant (standard value)
pub const RRF_K: f64 = 60.0;

/// Maximum alternative queries from expansion
const MAX_ALTERNATIVES: usize = 2;

/// Ceiling for the keyword boost
const KEYWORD_BOOST_CAP: f64 = 0.08;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "how", "what", "when",
    "where", "why", "are", "was", "can", "does", "use", "using", "you", "your", "not",
];

/// One ranked list entering fusion
#[derive(Debug, Clone)]
pub struct RankedList {
    pub weight: f64,
    /// Chunk ids in rank order
    pub hits: Vec<i64>,
}

/// Whether text retrieval alone is trusted: top score at or above the
/// threshold, a clear gap to the runner-up, and no relaxed fallback.
pub fn has_strong_signal(
    scores: &[f64],
    relaxed: bool,
    strong_score: f64,
    strong_gap: f64,
) -> bool {
    if relaxed {
        return false;
    }
    match scores {
        [] => false,
        [top] => *top >= strong_score,
        [top, second, ..] => *top >= strong_score && (top - second) >= strong_gap,
    }
}

/// Reciprocal-rank fusion: each hit at rank `r` (1-based) contributes
/// `weight / (k + r)`, with a small bonus for first and top-3 places.
pub fn rrf_fuse(lists: &[RankedList]) -> HashMap<i64, f64> {
    let mut scores: HashMap<i64, f64> = HashMap::new();
    for list in lists {
        for (rank0, chunk_id) in list.hits.iter().enumerate() {
            let rrf = list.weight / (RRF_K + (rank0 + 1) as f64);
            let bonus = if rank0 == 0 {
                0.05
            } else if rank0 < 3 {
                0.02
            } else {
                0.0
            };
            *scores.entry(*chunk_id).or_insert(0.0) += rrf + bonus;
        }
    }
    scores
}

/// Exact-substring keyword boost over path, title, context, and
/// preview, capped at `KEYWORD_BOOST_CAP`. Path matches count most.
pub fn keyword_boost(query: &str, item: &SearchItem) -> f64 {
    let mut boost: f64 = 0.0;
    for term in query_terms(query) {
        if item.path.to_lowercase().contains(&term) {
            boost += 0.04;
        }
        if item.title.to_lowercase().contains(&term) {
            boost += 0.03;
        }
        if let Some(context) = &item.context_path {
            if context.to_lowercase().contains(&term) {
                boost += 0.02;
            }
        }
        if item.preview.to_lowercase().contains(&term) {
            boost += 0.01;
        }
    }
    boost.min(KEYWORD_BOOST_CAP)
}

fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Full hybrid pipeline
pub async fn hybrid_search(
    db: &LibraryDb,
    source_name: &str,
    query: &str,
    options: &SearchOptions,
    embedder: Option<&dyn Embedder>,
    expander: Option<&dyn QueryExpander>,
) -> Result<Vec<SearchItem>> {
    let version = options.version_label.as_deref();
    let fetch = options.limit.max(8) * 3;

    // 1. Text retrieval, relaxing to prefix matches on empty results
    let mut relaxed = false;
    let mut text_hits = db.search_fts(&sanitize_word_query(query), fetch, version)?;
    if text_hits.is_empty() {
        let fallback = relaxed_query(query);
        if !fallback.is_empty() {
            text_hits = db.search_fts(&fallback, fetch, version)?;
            relaxed = !text_hits.is_empty();
        }
    }

    let mut items: HashMap<i64, SearchItem> = HashMap::new();
    for hit in &text_hits {
        items
            .entry(hit.chunk_id)
            .or_insert_with(|| item_from_fts(hit, source_name, hit.score));
    }

    // 2. Strong signal short-circuits expansion, not fusion
    let text_scores: Vec<f64> = text_hits.iter().map(|h| h.score).collect();
    let strong = has_strong_signal(
        &text_scores,
        relaxed,
        options.strong_score,
        options.strong_gap,
    );

    // 3. Alternative queries when the signal is weak
    let mut alternatives: Vec<String> = Vec::new();
    if !strong {
        if let Some(expander) = expander {
            match expander.expand(query, MAX_ALTERNATIVES).await {
                Ok(alts) => alternatives = alts,
                Err(e) => debug!(error = %e, "query expansion unavailable"),
            }
        }
    }

    // 4-5. Ranked lists: original text, original vector, alternates
    let text_weight = if relaxed { 1.2 } else { 2.0 };
    let alt_weight = if relaxed { 0.7 } else { 1.0 };
    let mut lists = vec![RankedList {
        weight: text_weight,
        hits: text_hits.iter().map(|h| h.chunk_id).collect(),
    }];

    let mut embedding_cache: HashMap<String, Vec<f32>> = HashMap::new();
    if let Some(embedder) = embedder {
        if let Some(hits) = vector_list(
            db, embedder, query, fetch, version, &mut embedding_cache, source_name, &mut items,
        )
        .await?
        {
            lists.push(RankedList {
                weight: 2.0,
                hits,
            });
        }
    }

    for alternative in &alternatives {
        let alt_hits = db.search_fts(&sanitize_word_query(alternative), fetch, version)?;
        for hit in &alt_hits {
            items
                .entry(hit.chunk_id)
                .or_insert_with(|| item_from_fts(hit, source_name, hit.score));
        }
        lists.push(RankedList {
            weight: alt_weight,
            hits: alt_hits.iter().map(|h| h.chunk_id).collect(),
        });

        if let Some(embedder) = embedder {
            if let Some(hits) = vector_list(
                db,
                embedder,
                alternative,
                fetch,
                version,
                &mut embedding_cache,
                source_name,
                &mut items,
            )
            .await?
            {
                lists.push(RankedList {
                    weight: alt_weight,
                    hits,
                });
            }
        }
    }

    // 6-7. Fuse, then boost exact keyword matches
    let fused = rrf_fuse(&lists);
    let mut results: Vec<SearchItem> = fused
        .into_iter()
        .filter_map(|(chunk_id, score)| {
            items.remove(&chunk_id).map(|mut item| {
                item.score = score + keyword_boost(query, &item);
                item
            })
        })
        .collect();

    // 8. Final ordering and confidence
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(options.limit);
    apply_confidence(&mut results);
    Ok(results)
}

/// Run one vector retrieval, caching query embeddings per text.
/// Returns `None` when embedding fails (hybrid downgrades to text).
#[allow(clippy::too_many_arguments)]
async fn vector_list(
    db: &LibraryDb,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
    version: Option<&str>,
    cache: &mut HashMap<String, Vec<f32>>,
    source_name: &str,
    items: &mut HashMap<i64, SearchItem>,
) -> Result<Option<Vec<i64>>> {
    let vector = match cache.get(query) {
        Some(vector) => vector.clone(),
        None => {
            let prefixed = format!("{}{}", QUERY_TASK_PREFIX, query);
            match embedder.embed(&prefixed).await {
                Ok(vector) => {
                    cache.insert(query.to_string(), vector.clone());
                    vector
                }
                Err(e) => {
                    debug!(error = %e, "embedding unavailable, text-only fusion");
                    return Ok(None);
                }
            }
        }
    };

    let hits = match db.search_vectors(&vector, limit, version) {
        Ok(hits) => hits,
        Err(e) => {
            debug!(error = %e, "vector search unavailable");
            return Ok(None);
        }
    };

    let mut ids = Vec::with_capacity(hits.len());
    for hit in hits {
        if let std::collections::hash_map::Entry::Vacant(entry) = items.entry(hit.chunk_id) {
            if let Some(chunk) = db.get_chunk(hit.chunk_id)? {
                let similarity = 1.0 / (1.0 + hit.distance);
                entry.insert(item_from_chunk(&chunk, source_name, similarity));
            } else {
                continue;
            }
        }
        ids.push(hit.chunk_id);
    }
    Ok(Some(ids))
}
