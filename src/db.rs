use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::pipeline::ScrapeStats;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn ping(conn: &Connection) -> Result<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scrape_runs (
            id             INTEGER PRIMARY KEY,
            item_limit     INTEGER NOT NULL,
            stored         INTEGER NOT NULL DEFAULT 0,
            skipped        INTEGER NOT NULL DEFAULT 0,
            write_failures INTEGER NOT NULL DEFAULT 0,
            categories     INTEGER NOT NULL DEFAULT 0,
            started_at     TEXT NOT NULL,
            finished_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_runs_started ON scrape_runs(started_at);
        ",
    )?;
    Ok(())
}

// ── Run ledger ──

pub fn start_run(conn: &Connection, limit: usize) -> Result<i64> {
    conn.execute(
        "INSERT INTO scrape_runs (item_limit, started_at) VALUES (?1, ?2)",
        rusqlite::params![limit as i64, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, run_id: i64, stats: &ScrapeStats) -> Result<()> {
    conn.execute(
        "UPDATE scrape_runs
         SET stored = ?2, skipped = ?3, write_failures = ?4, categories = ?5, finished_at = ?6
         WHERE id = ?1",
        rusqlite::params![
            run_id,
            stats.stored as i64,
            stats.skipped as i64,
            stats.write_failures as i64,
            stats.categories as i64,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub struct RunRow {
    pub id: i64,
    pub limit: i64,
    pub stored: i64,
    pub skipped: i64,
    pub write_failures: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
}

pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_limit, stored, skipped, write_failures, started_at, finished_at
         FROM scrape_runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                limit: row.get(1)?,
                stored: row.get(2)?,
                skipped: row.get(3)?,
                write_failures: row.get(4)?,
                started_at: row.get(5)?,
                finished_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
