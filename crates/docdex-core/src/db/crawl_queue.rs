//! Persistent crawl queue
//!
//! One row per normalized URL. Status moves
//! `pending → fetching → done | failed`; a worker owns a page from
//! claim until it reaches a terminal state. Claims pop by ascending
//! `(depth, id)` for BFS order with insertion-order ties.

use super::LibraryDb;
use crate::error::Result;
use chrono::Utc;
use rusqlite::params;

/// Crawl page status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    Pending,
    Fetching,
    Done,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "fetching" => Self::Fetching,
            "done" => Self::Done,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// One discovered URL
#[derive(Debug, Clone)]
pub struct CrawlPage {
    pub id: i64,
    pub source_id: i64,
    pub url: String,
    pub normalized_url: String,
    pub depth: u32,
    pub status: CrawlStatus,
    pub last_error: Option<String>,
}

/// Page counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlCounts {
    pub pending: usize,
    pub fetching: usize,
    pub done: usize,
    pub failed: usize,
}

impl CrawlCounts {
    pub fn total(&self) -> usize {
        self.pending + self.fetching + self.done + self.failed
    }
}

impl LibraryDb {
    /// Insert a page if its normalized URL is new. Existing rows are
    /// left untouched regardless of status. Returns whether a row was
    /// inserted.
    pub fn enqueue_page(
        &self,
        source_id: i64,
        url: &str,
        normalized_url: &str,
        depth: u32,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO crawl_pages (source_id, url, normalized_url, depth, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
            params![source_id, url, normalized_url, depth, now],
        )?;
        Ok(rows > 0)
    }

    /// Claim the next pending page (lowest depth, then insertion
    /// order) and mark it `fetching`.
    pub fn claim_next_page(&self, source_id: i64) -> Result<Option<CrawlPage>> {
        let result = self.conn.query_row(
            "SELECT id, source_id, url, normalized_url, depth, status, last_error
             FROM crawl_pages
             WHERE source_id = ?1 AND status = 'pending'
             ORDER BY depth ASC, id ASC LIMIT 1",
            params![source_id],
            row_to_page,
        );
        let page = match result {
            Ok(page) => page,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        self.conn.execute(
            "UPDATE crawl_pages SET status = 'fetching', updated_at = ?2 WHERE id = ?1",
            params![page.id, Utc::now().to_rfc3339()],
        )?;
        Ok(Some(CrawlPage {
            status: CrawlStatus::Fetching,
            ..page
        }))
    }

    /// Move a page to a terminal (or reset) state
    pub fn mark_page(&self, id: i64, status: CrawlStatus, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE crawl_pages SET status = ?2, last_error = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status.as_str(), error, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Return pages stranded in `fetching` (a previous run died) and
    /// pages that failed back to `pending` so a restart re-picks them.
    pub fn requeue_incomplete(&self, source_id: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE crawl_pages SET status = 'pending', updated_at = ?2
             WHERE source_id = ?1 AND status IN ('fetching', 'failed')",
            params![source_id, Utc::now().to_rfc3339()],
        )?;
        Ok(rows)
    }

    /// Drop the whole queue (force re-crawl)
    pub fn clear_crawl_queue(&self, source_id: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM crawl_pages WHERE source_id = ?1",
            params![source_id],
        )?;
        Ok(rows)
    }

    /// Page counts by status
    pub fn crawl_counts(&self, source_id: i64) -> Result<CrawlCounts> {
        let mut counts = CrawlCounts::default();
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM crawl_pages WHERE source_id = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map(params![source_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        for row in rows {
            let (status, count) = row?;
            match CrawlStatus::parse(&status) {
                CrawlStatus::Pending => counts.pending = count,
                CrawlStatus::Fetching => counts.fetching = count,
                CrawlStatus::Done => counts.done = count,
                CrawlStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    /// All pages for a source (status inspection and tests)
    pub fn list_crawl_pages(&self, source_id: i64) -> Result<Vec<CrawlPage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, url, normalized_url, depth, status, last_error
             FROM crawl_pages WHERE source_id = ?1 ORDER BY depth, id",
        )?;
        let pages = stmt
            .query_map(params![source_id], row_to_page)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pages)
    }
}

fn row_to_page(row: &rusqlite::Row) -> rusqlite::Result<CrawlPage> {
    let status: String = row.get(5)?;
    Ok(CrawlPage {
        id: row.get(0)?,
        source_id: row.get(1)?,
        url: row.get(2)?,
        normalized_url: row.get(3)?,
        depth: row.get(4)?,
        status: CrawlStatus::parse(&status),
        last_error: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dedupes_on_normalized_url() {
        let db = LibraryDb::open_in_memory().unwrap();
        assert!(db
            .enqueue_page(1, "https://x.dev/docs/", "https://x.dev/docs", 0)
            .unwrap());
        assert!(!db
            .enqueue_page(1, "https://x.dev/docs", "https://x.dev/docs", 1)
            .unwrap());
        assert_eq!(db.crawl_counts(1).unwrap().total(), 1);
    }

    #[test]
    fn test_claim_order_is_bfs() {
        let db = LibraryDb::open_in_memory().unwrap();
        db.enqueue_page(1, "https://x.dev/b", "https://x.dev/b", 1).unwrap();
        db.enqueue_page(1, "https://x.dev/a", "https://x.dev/a", 0).unwrap();
        db.enqueue_page(1, "https://x.dev/c", "https://x.dev/c", 1).unwrap();

        let first = db.claim_next_page(1).unwrap().unwrap();
        assert_eq!(first.url, "https://x.dev/a");
        assert_eq!(first.status, CrawlStatus::Fetching);

        // Same depth pops in insertion order
        let second = db.claim_next_page(1).unwrap().unwrap();
        assert_eq!(second.url, "https://x.dev/b");
    }

    #[test]
    fn test_status_transitions() {
        let db = LibraryDb::open_in_memory().unwrap();
        db.enqueue_page(1, "https://x.dev/a", "https://x.dev/a", 0).unwrap();

        let page = db.claim_next_page(1).unwrap().unwrap();
        db.mark_page(page.id, CrawlStatus::Failed, Some("body too short"))
            .unwrap();

        let counts = db.crawl_counts(1).unwrap();
        assert_eq!(counts.failed, 1);
        assert!(db.claim_next_page(1).unwrap().is_none());

        // Failed pages are re-picked after requeue without duplication
        assert_eq!(db.requeue_incomplete(1).unwrap(), 1);
        let page = db.claim_next_page(1).unwrap().unwrap();
        assert_eq!(page.url, "https://x.dev/a");
        db.mark_page(page.id, CrawlStatus::Done, None).unwrap();

        let counts = db.crawl_counts(1).unwrap();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_clear_queue() {
        let db = LibraryDb::open_in_memory().unwrap();
        db.enqueue_page(1, "https://x.dev/a", "https://x.dev/a", 0).unwrap();
        db.enqueue_page(1, "https://x.dev/b", "https://x.dev/b", 1).unwrap();
        assert_eq!(db.clear_crawl_queue(1).unwrap(), 2);
        assert_eq!(db.crawl_counts(1).unwrap().total(), 0);
    }
}
