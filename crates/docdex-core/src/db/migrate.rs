//! Numbered migrations and shared open-failure recovery
//!
//! Migrations are `(name, sql)` pairs applied in lexicographic order,
//! each inside its own transaction, and recorded in a `migrations`
//! table so a database can be reopened by any newer build. Both
//! database kinds also share the recovery policy for files that fail
//! to open with a recoverable I/O error: delete and recreate.

use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// A single schema migration
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Apply all pending migrations, returning how many ran
pub fn run_migrations(conn: &Connection, migrations: &[Migration]) -> Result<usize> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let mut ordered: Vec<&Migration> = migrations.iter().collect();
    ordered.sort_by_key(|m| m.name);

    let mut applied = 0;
    for migration in ordered {
        let done: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM migrations WHERE name = ?1",
                params![migration.name],
                |row| row.get(0),
            )
            .unwrap_or(false);
        if done {
            continue;
        }

        conn.execute("BEGIN", [])?;
        let result = (|| -> Result<()> {
            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO migrations (name, applied_at) VALUES (?1, ?2)",
                params![migration.name, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                applied += 1;
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                return Err(e);
            }
        }
    }

    Ok(applied)
}

/// Set the PRAGMAs shared by both database kinds
pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

/// Open errors that recreating the file can fix: truncated databases
/// and disk I/O failures. Anything else propagates.
pub(crate) fn is_recoverable_open_error(e: &crate::error::DocdexError) -> bool {
    let text = e.to_string().to_lowercase();
    text.contains("short read") || text.contains("disk i/o error")
}

/// Delete a database file and its WAL/SHM companions
pub(crate) fn remove_db_files(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let file = PathBuf::from(file);
        if file.exists() {
            std::fs::remove_file(&file)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MIGRATIONS: &[Migration] = &[
        Migration {
            name: "0002_second",
            sql: "ALTER TABLE t ADD COLUMN b TEXT;",
        },
        Migration {
            name: "0001_first",
            sql: "CREATE TABLE t (a TEXT);",
        },
    ];

    #[test]
    fn test_lexicographic_order() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = run_migrations(&conn, TEST_MIGRATIONS).unwrap();
        assert_eq!(applied, 2);

        let has_b: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('t') WHERE name = 'b'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(has_b);
    }

    #[test]
    fn test_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn, TEST_MIGRATIONS).unwrap(), 2);
        assert_eq!(run_migrations(&conn, TEST_MIGRATIONS).unwrap(), 0);
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        let bad = [Migration {
            name: "0001_bad",
            sql: "CREATE TABLE ok (a TEXT); THIS IS NOT SQL;",
        }];
        assert!(run_migrations(&conn, &bad).is_err());

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(recorded, 0);
    }

    #[test]
    fn test_recoverable_error_classes() {
        let short_read = crate::error::DocdexError::Sync("short read on database file".into());
        let disk_io = crate::error::DocdexError::Sync("disk I/O error".into());
        let other = crate::error::DocdexError::Sync("no such table: chunks".into());

        assert!(is_recoverable_open_error(&short_read));
        assert!(is_recoverable_open_error(&disk_io));
        assert!(!is_recoverable_open_error(&other));
    }

    #[test]
    fn test_remove_db_files_cleans_companions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.sqlite");
        for suffix in ["", "-wal", "-shm"] {
            std::fs::write(format!("{}{}", path.display(), suffix), b"x").unwrap();
        }

        remove_db_files(&path).unwrap();
        assert!(!path.exists());
        assert!(!dir.path().join("lib.sqlite-wal").exists());
    }
}
