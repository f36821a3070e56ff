//! Index database: sources and their synced versions

use super::migrate::{
    apply_pragmas, is_recoverable_open_error, remove_db_files, run_migrations, Migration,
};
use crate::error::{DocdexError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::warn;

const MIGRATIONS: &[Migration] = &[Migration {
    name: "0001_sources",
    sql: r#"
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    owner TEXT,
    repo TEXT,
    db_file TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    last_sync_at TEXT,
    last_commit TEXT,
    last_etag TEXT,
    last_error TEXT,
    git_ref TEXT,
    docs_path TEXT,
    ingest_mode TEXT NOT NULL DEFAULT 'docs',
    version_label TEXT,
    root_url TEXT,
    allowed_paths TEXT,
    denied_paths TEXT,
    max_depth INTEGER,
    max_pages INTEGER
);

CREATE TABLE IF NOT EXISTS source_versions (
    source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    version_label TEXT NOT NULL,
    git_ref TEXT,
    commit_sha TEXT,
    tree_hash TEXT,
    etag TEXT,
    synced_at TEXT NOT NULL,
    PRIMARY KEY (source_id, version_label)
);

CREATE INDEX IF NOT EXISTS idx_sources_kind ON sources(kind);
"#,
}];

/// Docs-only or whole-repo ingestion for a GitHub source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Docs,
    Repo,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docs => "docs",
            Self::Repo => "repo",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "repo" => Self::Repo,
            _ => Self::Docs,
        }
    }
}

/// Kind-specific source configuration
#[derive(Debug, Clone)]
pub enum SourceKind {
    GitHub {
        owner: String,
        repo: String,
        git_ref: Option<String>,
        docs_path: Option<String>,
        ingest_mode: IngestMode,
        version_label: Option<String>,
    },
    Web {
        root_url: String,
        allowed_paths: Vec<String>,
        denied_paths: Vec<String>,
        max_depth: u32,
        max_pages: u32,
    },
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub { .. } => "github",
            Self::Web { .. } => "web",
        }
    }
}

/// A registered library
#[derive(Debug, Clone)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub db_file: String,
    pub created_at: String,
    pub last_sync_at: Option<String>,
    pub last_commit: Option<String>,
    pub last_etag: Option<String>,
    pub last_error: Option<String>,
    pub kind: SourceKind,
}

impl Source {
    pub fn owner_repo(&self) -> Option<(&str, &str)> {
        match &self.kind {
            SourceKind::GitHub { owner, repo, .. } => Some((owner.as_str(), repo.as_str())),
            SourceKind::Web { .. } => None,
        }
    }
}

/// Parameters for registering a source
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub kind: SourceKind,
}

/// Last sync outcome for one (source, version label)
#[derive(Debug, Clone)]
pub struct SourceVersion {
    pub source_id: i64,
    pub version_label: String,
    pub git_ref: Option<String>,
    pub commit_sha: Option<String>,
    pub tree_hash: Option<String>,
    pub etag: Option<String>,
    pub synced_at: String,
}

/// Index database handle
pub struct IndexDb {
    conn: Connection,
}

impl IndexDb {
    /// Open the index DB at path, creating and migrating as needed.
    ///
    /// Like the library DBs, a file that fails to open with a
    /// recoverable I/O error (`short read`, `disk I/O error`) is
    /// deleted together with its WAL/SHM companions and recreated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Self::try_open(path) {
            Ok(db) => Ok(db),
            Err(e) if is_recoverable_open_error(&e) => {
                warn!(path = %path.display(), error = %e, "index DB unreadable, recreating");
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
        Ok(Self { conn })
    }

    /// In-memory index DB (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        run_migrations(&conn, MIGRATIONS)?;
        Ok(Self { conn })
    }

    /// Register a source; the library DB filename is derived after the
    /// row exists so it can embed the stable id.
    pub fn insert_source(&self, new: &NewSource) -> Result<Source> {
        let now = Utc::now().to_rfc3339();
        match &new.kind {
            SourceKind::GitHub {
                owner,
                repo,
                git_ref,
                docs_path,
                ingest_mode,
                version_label,
            } => {
                self.conn.execute(
                    "INSERT INTO sources (kind, name, owner, repo, created_at, git_ref, docs_path, ingest_mode, version_label)
                     VALUES ('github', ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![new.name, owner, repo, now, git_ref, docs_path, ingest_mode.as_str(), version_label],
                )?;
            }
            SourceKind::Web {
                root_url,
                allowed_paths,
                denied_paths,
                max_depth,
                max_pages,
            } => {
                self.conn.execute(
                    "INSERT INTO sources (kind, name, created_at, root_url, allowed_paths, denied_paths, max_depth, max_pages)
                     VALUES ('web', ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        new.name,
                        now,
                        root_url,
                        serde_json::to_string(allowed_paths)?,
                        serde_json::to_string(denied_paths)?,
                        max_depth,
                        max_pages
                    ],
                )?;
            }
        }

        let id = self.conn.last_insert_rowid();
        let (owner, repo) = match &new.kind {
            SourceKind::GitHub { owner, repo, .. } => (Some(owner.as_str()), Some(repo.as_str())),
            SourceKind::Web { .. } => (None, None),
        };
        let db_file = super::library_db_file(&new.name, owner, repo, id);
        self.conn.execute(
            "UPDATE sources SET db_file = ?2 WHERE id = ?1",
            params![id, db_file],
        )?;

        self.get_source(id)?
            .ok_or_else(|| DocdexError::SourceNotFound(id.to_string()))
    }

    /// Get source by id
    pub fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let result = self.conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_SOURCE),
            params![id],
            row_to_source,
        );
        match result {
            Ok(source) => Ok(Some(source)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find source by library name or `owner/repo`
    pub fn find_source(&self, query: &str) -> Result<Option<Source>> {
        let result = self.conn.query_row(
            &format!(
                "{} WHERE name = ?1 OR (owner || '/' || repo) = ?1 LIMIT 1",
                SELECT_SOURCE
            ),
            params![query],
            row_to_source,
        );
        match result {
            Ok(source) => Ok(Some(source)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all sources ordered by name
    pub fn list_sources(&self) -> Result<Vec<Source>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY name", SELECT_SOURCE))?;
        let sources = stmt
            .query_map([], row_to_source)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    /// Remove a source and its version rows
    pub fn remove_source(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sources WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Record the outcome of a sync on the source row
    pub fn update_source_sync(
        &self,
        id: i64,
        last_commit: Option<&str>,
        last_etag: Option<&str>,
        last_error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE sources SET last_sync_at = ?2, last_commit = COALESCE(?3, last_commit),
             last_etag = COALESCE(?4, last_etag), last_error = ?5
             WHERE id = ?1",
            params![id, Utc::now().to_rfc3339(), last_commit, last_etag, last_error],
        )?;
        Ok(())
    }

    /// Replace the version row for (source, label)
    pub fn upsert_source_version(&self, version: &SourceVersion) -> Result<()> {
        self.conn.execute(
            "INSERT INTO source_versions (source_id, version_label, git_ref, commit_sha, tree_hash, etag, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source_id, version_label) DO UPDATE SET
                git_ref = excluded.git_ref,
                commit_sha = excluded.commit_sha,
                tree_hash = excluded.tree_hash,
                etag = excluded.etag,
                synced_at = excluded.synced_at",
            params![
                version.source_id,
                version.version_label,
                version.git_ref,
                version.commit_sha,
                version.tree_hash,
                version.etag,
                version.synced_at
            ],
        )?;
        Ok(())
    }

    /// Get one version row
    pub fn get_source_version(
        &self,
        source_id: i64,
        label: &str,
    ) -> Result<Option<SourceVersion>> {
        let result = self.conn.query_row(
            "SELECT source_id, version_label, git_ref, commit_sha, tree_hash, etag, synced_at
             FROM source_versions WHERE source_id = ?1 AND version_label = ?2",
            params![source_id, label],
            row_to_version,
        );
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All known version rows for a source
    pub fn list_source_versions(&self, source_id: i64) -> Result<Vec<SourceVersion>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, version_label, git_ref, commit_sha, tree_hash, etag, synced_at
             FROM source_versions WHERE source_id = ?1 ORDER BY version_label",
        )?;
        let versions = stmt
            .query_map(params![source_id], row_to_version)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }
}

const SELECT_SOURCE: &str = "SELECT id, kind, name, owner, repo, db_file, created_at,
    last_sync_at, last_commit, last_etag, last_error,
    git_ref, docs_path, ingest_mode, version_label,
    root_url, allowed_paths, denied_paths, max_depth, max_pages
    FROM sources";

fn row_to_source(row: &Row) -> rusqlite::Result<Source> {
    let kind_str: String = row.get(1)?;
    let kind = if kind_str == "web" {
        let allowed: Option<String> = row.get(16)?;
        let denied: Option<String> = row.get(17)?;
        SourceKind::Web {
            root_url: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
            allowed_paths: allowed
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            denied_paths: denied
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            max_depth: row.get::<_, Option<u32>>(18)?.unwrap_or(3),
            max_pages: row.get::<_, Option<u32>>(19)?.unwrap_or(500),
        }
    } else {
        let mode: String = row.get(13)?;
        SourceKind::GitHub {
            owner: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            repo: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            git_ref: row.get(11)?,
            docs_path: row.get(12)?,
            ingest_mode: IngestMode::parse(&mode),
            version_label: row.get(14)?,
        }
    };

    Ok(Source {
        id: row.get(0)?,
        name: row.get(2)?,
        db_file: row.get(5)?,
        created_at: row.get(6)?,
        last_sync_at: row.get(7)?,
        last_commit: row.get(8)?,
        last_etag: row.get(9)?,
        last_error: row.get(10)?,
        kind,
    })
}

fn row_to_version(row: &Row) -> rusqlite::Result<SourceVersion> {
    Ok(SourceVersion {
        source_id: row.get(0)?,
        version_label: row.get(1)?,
        git_ref: row.get(2)?,
        commit_sha: row.get(3)?,
        tree_hash: row.get(4)?,
        etag: row.get(5)?,
        synced_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github_source(name: &str, owner: &str, repo: &str) -> NewSource {
        NewSource {
            name: name.to_string(),
            kind: SourceKind::GitHub {
                owner: owner.to_string(),
                repo: repo.to_string(),
                git_ref: None,
                docs_path: Some("docs".to_string()),
                ingest_mode: IngestMode::Docs,
                version_label: None,
            },
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = IndexDb::open_in_memory().unwrap();
        let source = db
            .insert_source(&github_source("honojs/website", "honojs", "website"))
            .unwrap();

        assert_eq!(source.db_file, format!("honojs-website-{}.sqlite", source.id));
        assert!(db.find_source("honojs/website").unwrap().is_some());
        assert!(db.find_source("nope").unwrap().is_none());
    }

    #[test]
    fn test_web_source_roundtrip() {
        let db = IndexDb::open_in_memory().unwrap();
        let source = db
            .insert_source(&NewSource {
                name: "hono.dev".to_string(),
                kind: SourceKind::Web {
                    root_url: "https://hono.dev/docs".to_string(),
                    allowed_paths: vec!["/docs".to_string()],
                    denied_paths: vec![],
                    max_depth: 2,
                    max_pages: 100,
                },
            })
            .unwrap();

        match source.kind {
            SourceKind::Web {
                root_url,
                allowed_paths,
                max_depth,
                ..
            } => {
                assert_eq!(root_url, "https://hono.dev/docs");
                assert_eq!(allowed_paths, vec!["/docs".to_string()]);
                assert_eq!(max_depth, 2);
            }
            _ => panic!("expected web source"),
        }
    }

    #[test]
    fn test_version_row_replaced() {
        let db = IndexDb::open_in_memory().unwrap();
        let source = db.insert_source(&github_source("h", "h", "w")).unwrap();

        let mut version = SourceVersion {
            source_id: source.id,
            version_label: "16.x".to_string(),
            git_ref: Some("v16.1.0".to_string()),
            commit_sha: Some("abc".to_string()),
            tree_hash: None,
            etag: None,
            synced_at: Utc::now().to_rfc3339(),
        };
        db.upsert_source_version(&version).unwrap();

        version.commit_sha = Some("def".to_string());
        db.upsert_source_version(&version).unwrap();

        let stored = db.get_source_version(source.id, "16.x").unwrap().unwrap();
        assert_eq!(stored.commit_sha.as_deref(), Some("def"));
        assert_eq!(db.list_source_versions(source.id).unwrap().len(), 1);
    }

    #[test]
    fn test_update_sync_bookkeeping() {
        let db = IndexDb::open_in_memory().unwrap();
        let source = db.insert_source(&github_source("h", "h", "w")).unwrap();

        db.update_source_sync(source.id, Some("sha1"), Some("etag1"), None)
            .unwrap();
        let source = db.get_source(source.id).unwrap().unwrap();
        assert_eq!(source.last_commit.as_deref(), Some("sha1"));
        assert!(source.last_sync_at.is_some());
        assert!(source.last_error.is_none());

        // Error recorded, prior commit retained
        db.update_source_sync(source.id, None, None, Some("boom"))
            .unwrap();
        let source = db.get_source(source.id).unwrap().unwrap();
        assert_eq!(source.last_commit.as_deref(), Some("sha1"));
        assert_eq!(source.last_error.as_deref(), Some("boom"));
    }
}
