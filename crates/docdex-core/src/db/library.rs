//! Library database: documents, blobs, chunks, embeddings, crawl queue

use super::migrate::{
    apply_pragmas, is_recoverable_open_error, remove_db_files, run_migrations, Migration,
};
use crate::error::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::warn;

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_documents",
        sql: r#"
CREATE TABLE IF NOT EXISTS document_blobs (
    hash TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    version_label TEXT NOT NULL,
    uri TEXT NOT NULL,
    title TEXT NOT NULL,
    hash TEXT NOT NULL REFERENCES document_blobs(hash),
    content_type TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    UNIQUE(source_id, path, version_label)
);

CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(hash);
CREATE INDEX IF NOT EXISTS idx_documents_active ON documents(active);
CREATE INDEX IF NOT EXISTS idx_documents_version ON documents(version_label);
"#,
    },
    Migration {
        name: "0002_chunks",
        sql: r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    chunk_type TEXT NOT NULL,
    language TEXT,
    symbol_name TEXT,
    symbol_type TEXT,
    symbol_id TEXT,
    symbol_part_index INTEGER,
    symbol_part_count INTEGER,
    line_start INTEGER,
    line_end INTEGER,
    char_start INTEGER,
    char_end INTEGER,
    token_count INTEGER NOT NULL,
    chunk_sha TEXT NOT NULL,
    content TEXT NOT NULL,
    context_path TEXT,
    doc_path TEXT NOT NULL,
    doc_uri TEXT NOT NULL,
    doc_title TEXT NOT NULL,
    UNIQUE(document_id, position)
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    title,
    path,
    context,
    uri,
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS chunks_ai
AFTER INSERT ON chunks
BEGIN
    INSERT INTO chunks_fts(rowid, content, title, path, context, uri)
    VALUES (new.id, new.content, new.doc_title, new.doc_path, new.context_path, new.doc_uri);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au
AFTER UPDATE ON chunks
BEGIN
    DELETE FROM chunks_fts WHERE rowid = old.id;
    INSERT INTO chunks_fts(rowid, content, title, path, context, uri)
    VALUES (new.id, new.content, new.doc_title, new.doc_path, new.context_path, new.doc_uri);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad
AFTER DELETE ON chunks
BEGIN
    DELETE FROM chunks_fts WHERE rowid = old.id;
END;

CREATE TABLE IF NOT EXISTS chunk_vectors (
    chunk_id INTEGER NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (chunk_id, model)
);
"#,
    },
    Migration {
        name: "0003_crawl_pages",
        sql: r#"
CREATE TABLE IF NOT EXISTS crawl_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    depth INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(source_id, normalized_url)
);

CREATE INDEX IF NOT EXISTS idx_crawl_pages_status ON crawl_pages(source_id, status, depth, id);
"#,
    },
];

/// Library database handle
pub struct LibraryDb {
    pub(crate) conn: Connection,
    path: Option<PathBuf>,
}

impl LibraryDb {
    /// Open a library DB, creating and migrating as needed.
    ///
    /// A corrupt file that fails with a recoverable I/O error
    /// (`short read`, `disk I/O error`) is deleted together with its
    /// WAL/SHM companions and recreated from scratch.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Self::try_open(path) {
            Ok(db) => Ok(db),
            Err(e) if is_recoverable_open_error(&e) => {
                warn!(path = %path.display(), error = %e, "library DB unreadable, recreating");
                remove_db_files(path)?;
                Self::try_open(path)
            }
            Err(e) => Err(e),
        }
    }

    fn try_open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        run_migrations(&conn, MIGRATIONS)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory library DB (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        run_migrations(&conn, MIGRATIONS)?;
        Ok(Self { conn, path: None })
    }

    /// Filesystem path of this database, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_schema() {
        let db = LibraryDb::open_in_memory().unwrap();
        let tables: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('document_blobs', 'documents', 'chunks', 'chunk_vectors', 'crawl_pages')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);

        let has_fts: bool = db
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = 'chunks_fts'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(has_fts);
    }

}
