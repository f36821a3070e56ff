//! Docdex Core Library
//!
//! Core functionality for the docdex local documentation indexer.
//!
//! # Features
//! - Per-library SQLite storage with FTS5 full-text search
//! - GitHub archive sync with etag/SHA change detection
//! - Resumable breadth-first website crawling
//! - Heading- and syntax-tree-aware chunking
//! - Hybrid search with Reciprocal Rank Fusion (RRF)

pub mod chunk;
pub mod config;
pub mod crawl;
pub mod db;
pub mod embed;
pub mod engine;
pub mod error;
pub mod github;
pub mod ingest;
pub mod search;

pub use chunk::{build_document_chunks, ChunkDraft, ChunkType};
pub use config::Config;
pub use db::{IndexDb, LibraryDb, Source, SourceKind};
pub use engine::Engine;
pub use error::{DocdexError, Error, Result};
pub use ingest::{ingest_source, IngestOptions, SourceReport};
pub use search::{search, SearchItem, SearchMode, SearchOptions};

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "docdex";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "docdex";
