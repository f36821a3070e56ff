//! Database layer for docdex
//!
//! Two SQLite scopes cooperate:
//! - the index DB tracks sources and their synced versions;
//! - each source owns a library DB holding documents, blobs, chunks,
//!   embeddings, and the crawl queue, with an FTS5 index maintained
//!   by triggers.

mod crawl_queue;
mod documents;
mod index;
mod library;
mod migrate;
mod vectors;

pub mod chunks;

pub use crawl_queue::{CrawlCounts, CrawlPage, CrawlStatus};
pub use documents::{
    slice_lines, Document, DocumentUpsert, UpsertOutcome, MAX_SLICE_SPAN,
};
pub use index::{IndexDb, IngestMode, NewSource, Source, SourceKind, SourceVersion};
pub use library::LibraryDb;
pub use migrate::{run_migrations, Migration};
pub use vectors::{bytes_to_embedding, cosine_distance, embedding_to_bytes, VectorHit};

use sha2::{Digest, Sha256};

/// Hash content using SHA-256
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Library DB filename derived from identity plus source id, so the
/// file stays stable when a source is renamed.
pub fn library_db_file(name: &str, owner: Option<&str>, repo: Option<&str>, id: i64) -> String {
    let stem = match (owner, repo) {
        (Some(o), Some(r)) => format!("{}-{}", slug(o), slug(r)),
        _ => slug(name),
    };
    format!("{}-{}.sqlite", stem, id)
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content() {
        let hash = hash_content("Hello, World!");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_content("Hello, World!"));
    }

    #[test]
    fn test_library_db_file_from_owner_repo() {
        let file = library_db_file("honojs/website", Some("honojs"), Some("website"), 7);
        assert_eq!(file, "honojs-website-7.sqlite");
    }

    #[test]
    fn test_library_db_file_from_name() {
        let file = library_db_file("Hono Docs", None, None, 3);
        assert_eq!(file, "hono-docs-3.sqlite");
    }
}
