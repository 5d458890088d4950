use crate::models::{CrawlRun, CycleStats, ListingRecord, StoredListing};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

// ── Store trait ───────────────────────────────────────────────────────────────

/// Seen-listing store. `mark_seen` is the only write to the seen set.
pub trait ListingStore: Send + Sync {
    fn has_seen(&self, identity: &str) -> Result<bool>;

    /// Insert `record` under its identity. `Ok(false)` when it already existed.
    fn mark_seen(&self, record: &ListingRecord, seen_at: NaiveDateTime) -> Result<bool>;

    /// Bookkeeping for a finished cycle; stores without a run log ignore it.
    fn record_cycle(
        &self,
        _started_at: NaiveDateTime,
        _stats: &CycleStats,
        _error: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    id            VARCHAR PRIMARY KEY,
    title         VARCHAR NOT NULL,
    price         VARCHAR NOT NULL,
    location      VARCHAR NOT NULL,
    url           VARCHAR NOT NULL,
    image_url     VARCHAR,
    seller        VARCHAR NOT NULL DEFAULT '',
    published_at  VARCHAR,
    first_seen    TIMESTAMP NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS crawl_run_ids START 1;

CREATE TABLE IF NOT EXISTS crawl_runs (
    id           BIGINT PRIMARY KEY DEFAULT nextval('crawl_run_ids'),
    started_at   TIMESTAMP NOT NULL,
    finished_at  TIMESTAMP,
    status       VARCHAR NOT NULL,
    pages        BIGINT DEFAULT 0,
    found        BIGINT DEFAULT 0,
    sent         BIGINT DEFAULT 0,
    skipped      BIGINT DEFAULT 0,
    error_msg    VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_listings_first_seen ON listings (first_seen);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    /// Open (or create) the database file and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> Result<Self> {
        let repo = Self { conn: Mutex::new(conn) };
        repo.run_migrations()?;
        Ok(repo)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("DuckDB connection lock poisoned"))
    }

    pub fn run_migrations(&self) -> Result<()> {
        debug!("Running migrations…");
        let conn = self.conn()?;
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        debug!("Migrations done.");
        Ok(())
    }

    // ── Listings ──────────────────────────────────────────────────────────────

    pub fn listing_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM listings")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn first_seen_range(&self) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT MIN(first_seen), MAX(first_seen) FROM listings")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    pub fn list_listings(&self) -> Result<Vec<StoredListing>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, title, price, location, url, image_url, seller, published_at, first_seen
               FROM listings ORDER BY first_seen, id"#,
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(StoredListing {
                    id: r.get(0)?,
                    title: r.get(1)?,
                    price: r.get(2)?,
                    location: r.get(3)?,
                    url: r.get(4)?,
                    image_url: r.get(5)?,
                    seller: r.get(6)?,
                    published_at: r.get(7)?,
                    first_seen: r.get(8)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Crawl run log ─────────────────────────────────────────────────────────

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<CrawlRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, started_at, finished_at, status, pages, found, sent, skipped, error_msg
               FROM crawl_runs ORDER BY id DESC LIMIT ?"#,
        )?;
        let runs = stmt
            .query_map(params![limit as i64], |r| {
                Ok(CrawlRun {
                    id: r.get(0)?,
                    started_at: r.get(1)?,
                    finished_at: r.get(2)?,
                    status: r.get(3)?,
                    pages: r.get(4)?,
                    found: r.get(5)?,
                    sent: r.get(6)?,
                    skipped: r.get(7)?,
                    error_msg: r.get(8)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(runs)
    }
}

impl ListingStore for Repository {
    fn has_seen(&self, identity: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM listings WHERE id = ?", params![identity], |r| r.get(0))
            .context("seen lookup failed")?;
        Ok(n > 0)
    }

    fn mark_seen(&self, record: &ListingRecord, seen_at: NaiveDateTime) -> Result<bool> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM listings WHERE id = ?",
            params![record.identity],
            |r| r.get(0),
        )?;
        if existing > 0 {
            debug!("{} already stored", record.identity);
            return Ok(false); // tx rolls back on drop
        }

        tx.execute(
            r#"INSERT INTO listings
                   (id, title, price, location, url, image_url, seller, published_at, first_seen)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                record.identity,
                record.title,
                record.price,
                record.location,
                record.url,
                record.image_url,
                record.seller_name,
                record.published_at,
                seen_at,
            ],
        )
        .with_context(|| format!("insert listing {}", record.url))?;

        tx.commit()?;
        Ok(true)
    }

    fn record_cycle(
        &self,
        started_at: NaiveDateTime,
        stats: &CycleStats,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO crawl_runs
                   (started_at, finished_at, status, pages, found, sent, skipped, error_msg)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                started_at,
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "aborted" },
                stats.pages.len() as i64,
                stats.total_found() as i64,
                stats.total_new() as i64,
                stats.total_skipped() as i64,
                error,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{listing_identity, PageStats};

    fn record(url: &str) -> ListingRecord {
        ListingRecord {
            identity: listing_identity(url),
            title: "Stan".into(),
            price: "90000 €".into(),
            location: "Podgorica".into(),
            url: url.into(),
            image_url: Some("https://cdn/x.jpg".into()),
            seller_name: "Ana Marković".into(),
            published_at: None,
        }
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    fn repo() -> Repository {
        Repository::open_in_memory().unwrap()
    }

    #[test]
    fn test_mark_seen_is_idempotent() {
        let repo = repo();
        let r = record("https://estitor.com/me/oglas/1");
        assert!(!repo.has_seen(&r.identity).unwrap());
        assert!(repo.mark_seen(&r, now()).unwrap());
        assert!(repo.has_seen(&r.identity).unwrap());
        assert!(!repo.mark_seen(&r, now()).unwrap());
        assert_eq!(repo.listing_count().unwrap(), 1);
    }

    #[test]
    fn test_migrations_rerunnable() {
        let repo = repo();
        repo.mark_seen(&record("https://a/1"), now()).unwrap();
        repo.run_migrations().unwrap();
        assert_eq!(repo.listing_count().unwrap(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/listings.duckdb");
        let r = record("https://estitor.com/me/oglas/77");
        {
            let repo = Repository::open(&path).unwrap();
            assert!(repo.mark_seen(&r, now()).unwrap());
        }
        let repo = Repository::open(&path).unwrap();
        assert!(repo.has_seen(&listing_identity("https://estitor.com/me/oglas/77")).unwrap());
        assert!(!repo.mark_seen(&r, now()).unwrap());
    }

    #[test]
    fn test_fresh_file_usable_without_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(&dir.path().join("fresh.duckdb")).unwrap();
        let r = record("https://estitor.com/me/oglas/5");
        assert!(!repo.has_seen(&r.identity).unwrap());
        assert!(repo.mark_seen(&r, now()).unwrap());
        repo.record_cycle(now(), &CycleStats::default(), None).unwrap();
        assert_eq!(repo.recent_runs(1).unwrap().len(), 1);
    }

    #[test]
    fn test_list_listings_round_trips_fields() {
        let repo = repo();
        let r = record("https://a/2");
        repo.mark_seen(&r, now()).unwrap();
        let rows = repo.list_listings().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, r.identity);
        assert_eq!(rows[0].seller, "Ana Marković");
        assert_eq!(rows[0].image_url.as_deref(), Some("https://cdn/x.jpg"));
        assert!(rows[0].published_at.is_none());
    }

    #[test]
    fn test_cycle_log() {
        let repo = repo();
        let mut page = PageStats::new(1, "u");
        page.found = 3;
        page.sent = 1;
        page.skip(crate::models::SkipReason::Agency);
        let stats = CycleStats { pages: vec![page] };

        repo.record_cycle(now(), &stats, None).unwrap();
        repo.record_cycle(now(), &CycleStats::default(), Some("store down")).unwrap();

        let runs = repo.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, "aborted");
        assert_eq!(runs[1].status, "success");
        assert_eq!((runs[1].found, runs[1].sent, runs[1].skipped), (3, 1, 1));
    }
}
