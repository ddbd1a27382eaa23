//! The persistent index (spec §4.1): a single embedded relational store
//! (SQLite via `rusqlite`) holding the FileEntry base table, an FTS5 trigram
//! index over `(name, path)`, a bigram posting table, and the `watch_root` /
//! `ignore_pattern` tables that back the Coordinator's persisted state.
//!
//! Concurrency: SQLite runs in WAL mode so readers never block writers and
//! writers never block readers (spec §5). A `busy_timeout` pragma absorbs
//! writer/writer contention between the Scanner's worker threads and the
//! Watcher's debounce thread; true unique-constraint races are avoided
//! structurally by using `INSERT ... ON CONFLICT(path) DO UPDATE` for every
//! upsert, so the "treat the insert as an upsert and retry once" failure
//! semantics from spec §4.1 falls out of the schema rather than needing a
//! retry loop.

use std::path::Path;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CoreError, Result};
use crate::fold::{char_windows, fold, folded_len};
use crate::types::{
    name_of, parent_of, FileEntry, FileKind, FileTypeFilter, NewFileEntry, RootStatus,
    SearchQuery, SearchResultItem, SearchResults, SortKey, WatchRoot,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS file_entry (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    name_fold   TEXT NOT NULL,
    path        TEXT NOT NULL UNIQUE,
    path_fold   TEXT NOT NULL,
    kind        TEXT NOT NULL CHECK (kind IN ('file', 'directory')),
    size        INTEGER NOT NULL DEFAULT 0,
    mtime       REAL NOT NULL,
    parent_path TEXT
);
CREATE INDEX IF NOT EXISTS idx_file_entry_path ON file_entry(path);
CREATE INDEX IF NOT EXISTS idx_file_entry_parent ON file_entry(parent_path);
CREATE INDEX IF NOT EXISTS idx_file_entry_path_fold ON file_entry(path_fold);

CREATE VIRTUAL TABLE IF NOT EXISTS file_fts USING fts5(
    name, path, tokenize = 'trigram'
);

CREATE TABLE IF NOT EXISTS bigram_posting (
    file_id  INTEGER NOT NULL,
    bigram   TEXT NOT NULL,
    position INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bigram_bigram ON bigram_posting(bigram);
CREATE INDEX IF NOT EXISTS idx_bigram_file ON bigram_posting(file_id);

CREATE TABLE IF NOT EXISTS watch_root (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    path          TEXT NOT NULL UNIQUE,
    enabled       INTEGER NOT NULL DEFAULT 1,
    status        TEXT NOT NULL DEFAULT 'idle',
    total_files   INTEGER NOT NULL DEFAULT 0,
    indexed_files INTEGER NOT NULL DEFAULT 0,
    last_full_scan REAL,
    last_updated   REAL,
    error_message  TEXT
);

CREATE TABLE IF NOT EXISTS ignore_pattern (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern TEXT NOT NULL UNIQUE,
    seq     INTEGER NOT NULL
);
"#;

#[derive(Debug)]
struct ConnectionSetup;

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionSetup {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.create_collation("CASELESS", |a, b| {
            fold(a).cmp(&fold(b))
        })?;
        Ok(())
    }
}

/// Owns the connection pool. Cheaply `Clone`-able (pool is an `Arc` internally
/// plus one extra field), so a `Store` can be handed by value to each Scanner
/// worker thread and to the Watcher's debounce thread.
#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    batch_size: usize,
}

impl Store {
    /// Open (creating if absent) the index file at `path`, running schema
    /// migration. `batch_size` bounds how many rows `upsert_many` commits in
    /// one transaction (spec §4.1: "amortize fsync"). On a genuinely fresh
    /// database (the file didn't exist before this call), the default ignore
    /// set (spec §6) is seeded once.
    pub fn open(path: &Path, batch_size: usize) -> Result<Self> {
        let is_fresh = !path.exists();

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(8)
            .connection_customizer(Box::new(ConnectionSetup))
            .build(manager)
            .map_err(CoreError::Pool)?;

        let conn = pool.get().map_err(CoreError::Pool)?;
        conn.execute_batch(SCHEMA).map_err(|e| {
            CoreError::StoreCorruption(format!("failed to apply schema at {}: {e}", path.display()))
        })?;
        drop(conn);

        let store = Self { pool, batch_size };
        if is_fresh {
            store.add_default_ignores()?;
        }
        Ok(store)
    }

    /// Open a private, in-memory store — used by tests.
    ///
    /// `SqliteConnectionManager::memory()` opens a *separate* private
    /// in-memory database per connection, so the pool is capped at a single
    /// connection here: every caller of `self.conn()` — including Scanner
    /// worker threads and the Watcher's debounce thread in tests that
    /// exercise background writers — must land on the one connection that
    /// actually has the schema, never a schema-less sibling. r2d2 serializes
    /// concurrent checkouts against that single connection, which is fine for
    /// tests (the real `open` path uses a file-backed multi-connection pool).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(ConnectionSetup))
            .build(manager)
            .map_err(CoreError::Pool)?;
        let conn = pool.get().map_err(CoreError::Pool)?;
        conn.execute_batch(SCHEMA)?;
        drop(conn);
        Ok(Self { pool, batch_size: 64 })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(CoreError::Pool)
    }

    // -----------------------------------------------------------------
    // Upsert / delete / rename (spec §4.1)
    // -----------------------------------------------------------------

    /// Insert-or-update every entry in `batch` by unique `path`, in one
    /// transaction, mirroring the FTS doc and bigram postings for each row
    /// (invariants I2, I3).
    pub fn upsert_many(&self, batch: &[NewFileEntry]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for entry in batch {
            upsert_one(&tx, entry)?;
        }
        tx.commit()?;
        Ok(batch.len())
    }

    /// Remove the row at `path` plus its FTS doc and bigram postings. Returns
    /// whether a row existed.
    pub fn delete_path(&self, path: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id: Option<i64> =
            tx.query_row("SELECT id FROM file_entry WHERE path = ?1", params![path], |r| r.get(0))
                .optional()?;
        let Some(id) = id else {
            return Ok(false);
        };
        delete_by_id(&tx, id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Remove every row whose path equals `prefix` or begins with
    /// `prefix + '/'`. Returns the number of rows removed.
    pub fn delete_subtree(&self, prefix: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let (lower, upper) = subtree_range(prefix);
        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM file_entry WHERE path = ?1 OR (path >= ?2 AND path < ?3)",
            )?;
            let rows = stmt.query_map(params![prefix, lower, upper], |r| r.get(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        for id in &ids {
            delete_by_id(&tx, *id)?;
        }
        tx.commit()?;
        Ok(ids.len())
    }

    /// `clear_root` is `delete_subtree` on the root path (spec §4.1).
    pub fn clear_root(&self, root_path: &str) -> Result<usize> {
        self.delete_subtree(root_path)
    }

    /// Atomically rename `old_path` to `new_path`, cascading to every
    /// descendant whose path begins with `old_path + '/'` (spec §4.1).
    /// Returns the number of rows touched (the renamed entry plus descendants).
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let id: Option<i64> = tx
            .query_row("SELECT id FROM file_entry WHERE path = ?1", params![old_path], |r| {
                r.get(0)
            })
            .optional()?;
        let Some(id) = id else {
            return Ok(0);
        };

        let new_name = name_of(new_path);
        let new_parent = parent_of(new_path);
        tx.execute(
            "UPDATE file_entry SET name = ?1, name_fold = ?2, path = ?3, path_fold = ?4, parent_path = ?5 WHERE id = ?6",
            params![new_name, fold(&new_name), new_path, fold(new_path), new_parent, id],
        )?;
        rewrite_fts(&tx, id, &new_name, new_path)?;
        rewrite_bigrams(&tx, id, &new_name)?;

        let (lower, upper) = subtree_range(old_path);
        let descendants: Vec<(i64, String)> = {
            let mut stmt =
                tx.prepare("SELECT id, path FROM file_entry WHERE path >= ?1 AND path < ?2")?;
            let rows = stmt.query_map(params![lower, upper], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
            })?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let mut touched = 1usize;
        for (desc_id, desc_path) in &descendants {
            let suffix = &desc_path[old_path.len()..];
            let replacement_path = format!("{new_path}{suffix}");
            let replacement_parent = parent_of(&replacement_path);
            tx.execute(
                "UPDATE file_entry SET path = ?1, path_fold = ?2, parent_path = ?3 WHERE id = ?4",
                params![replacement_path, fold(&replacement_path), replacement_parent, desc_id],
            )?;
            tx.execute(
                "UPDATE file_fts SET path = ?1 WHERE rowid = ?2",
                params![replacement_path, desc_id],
            )?;
            touched += 1;
        }

        tx.commit()?;
        Ok(touched)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM file_entry", [], |r| r.get(0))?)
    }

    pub fn kind_of(&self, path: &str) -> Result<Option<FileKind>> {
        let conn = self.conn()?;
        let kind: Option<String> = conn
            .query_row("SELECT kind FROM file_entry WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(kind.and_then(|k| FileKind::from_db_str(&k)))
    }

    // -----------------------------------------------------------------
    // Search (spec §4.1 query planner)
    // -----------------------------------------------------------------

    pub fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let conn = self.conn()?;
        let folded = fold(query.query.trim());
        let tokens: Vec<&str> = folded.split_whitespace().collect();

        let candidates: Option<Vec<i64>> = if tokens.is_empty() {
            None // sentinel: "match everything"
        } else {
            let mut acc: Option<std::collections::HashSet<i64>> = None;
            for token in &tokens {
                let ids = candidates_for_token(&conn, token)?;
                acc = Some(match acc {
                    None => ids,
                    Some(prev) => prev.intersection(&ids).copied().collect(),
                });
            }
            Some(acc.unwrap_or_default().into_iter().collect())
        };

        run_filtered_query(&conn, candidates, query)
    }
}

/// `[prefix, prefix + '/', upper_bound)` — an exclusive range covering every
/// path that starts with `prefix + '/'`, expressed so SQLite can use the
/// `idx_file_entry_path` index instead of scanning the whole table.
fn subtree_range(prefix: &str) -> (String, String) {
    let lower = format!("{prefix}/");
    let mut upper = lower.clone().into_bytes();
    // Increment the last byte to get the smallest string that is not a
    // prefix-extension of `lower` (classic "prefix scan" upper bound).
    if let Some(last) = upper.last_mut() {
        *last += 1;
    }
    (lower, String::from_utf8(upper).unwrap_or_else(|_| format!("{prefix}0")))
}

fn upsert_one(tx: &rusqlite::Transaction<'_>, entry: &NewFileEntry) -> Result<()> {
    let id: i64 = tx.query_row(
        "INSERT INTO file_entry (name, name_fold, path, path_fold, kind, size, mtime, parent_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(path) DO UPDATE SET
            name = excluded.name,
            name_fold = excluded.name_fold,
            kind = excluded.kind,
            size = excluded.size,
            mtime = excluded.mtime,
            parent_path = excluded.parent_path
         RETURNING id",
        params![
            entry.name,
            fold(&entry.name),
            entry.path,
            fold(&entry.path),
            entry.kind.as_db_str(),
            entry.size,
            entry.mtime,
            entry.parent_path,
        ],
        |r| r.get(0),
    )?;
    rewrite_fts(tx, id, &entry.name, &entry.path)?;
    rewrite_bigrams(tx, id, &entry.name)?;
    Ok(())
}

fn rewrite_fts(tx: &rusqlite::Transaction<'_>, id: i64, name: &str, path: &str) -> Result<()> {
    tx.execute("DELETE FROM file_fts WHERE rowid = ?1", params![id])?;
    tx.execute(
        "INSERT INTO file_fts (rowid, name, path) VALUES (?1, ?2, ?3)",
        params![id, fold(name), fold(path)],
    )?;
    Ok(())
}

/// Replace bigram postings for `id`: existing rows deleted, then one row per
/// 2-character window over the case-folded name, only when `len(name) >= 2`
/// (invariant I3).
fn rewrite_bigrams(tx: &rusqlite::Transaction<'_>, id: i64, name: &str) -> Result<()> {
    tx.execute("DELETE FROM bigram_posting WHERE file_id = ?1", params![id])?;
    let folded = fold(name);
    if folded_len(name) < 2 {
        return Ok(());
    }
    for (pos, window) in char_windows(&folded, 2).into_iter().enumerate() {
        tx.execute(
            "INSERT INTO bigram_posting (file_id, bigram, position) VALUES (?1, ?2, ?3)",
            params![id, window, pos as i64],
        )?;
    }
    Ok(())
}

fn delete_by_id(tx: &rusqlite::Transaction<'_>, id: i64) -> Result<()> {
    tx.execute("DELETE FROM file_entry WHERE id = ?1", params![id])?;
    tx.execute("DELETE FROM file_fts WHERE rowid = ?1", params![id])?;
    tx.execute("DELETE FROM bigram_posting WHERE file_id = ?1", params![id])?;
    Ok(())
}

/// Resolve one whitespace-separated query token to the set of matching file
/// ids, using the tier selected by its folded length (spec §4.1 table).
fn candidates_for_token(conn: &Connection, token: &str) -> Result<std::collections::HashSet<i64>> {
    let len = token.chars().count();
    let mut out = std::collections::HashSet::new();
    if len == 1 {
        let mut stmt = conn.prepare(
            "SELECT id FROM file_entry WHERE name_fold LIKE ?1 ESCAPE '\\' OR path_fold LIKE ?1 ESCAPE '\\'",
        )?;
        let rows = stmt.query_map(params![escape_like(token)], |r| r.get(0))?;
        for row in rows {
            out.insert(row?);
        }
    } else if len == 2 {
        let mut stmt = conn.prepare("SELECT DISTINCT file_id FROM bigram_posting WHERE bigram = ?1")?;
        let rows = stmt.query_map(params![token], |r| r.get(0))?;
        for row in rows {
            out.insert(row?);
        }
    } else {
        // FTS5 phrase query: quoting forces the trigram tokenizer to require
        // the exact consecutive sequence, i.e. true substring containment.
        let phrase = format!("\"{}\"", token.replace('"', "\"\""));
        let mut stmt = conn.prepare("SELECT rowid FROM file_fts WHERE file_fts MATCH ?1")?;
        let rows = stmt.query_map(params![phrase], |r| r.get(0))?;
        for row in rows {
            out.insert(row?);
        }
    }
    Ok(out)
}

/// Escape `%`, `_`, and the escape character itself for a `LIKE ... ESCAPE '\'`
/// pattern, then wrap in `%...%` for substring matching.
fn escape_like(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("%{escaped}%")
}

fn run_filtered_query(
    conn: &Connection,
    candidates: Option<Vec<i64>>,
    query: &SearchQuery,
) -> Result<SearchResults> {
    conn.execute_batch("CREATE TEMP TABLE IF NOT EXISTS candidate_ids (id INTEGER PRIMARY KEY)")?;
    conn.execute("DELETE FROM candidate_ids", [])?;
    let using_candidates = candidates.is_some();
    if let Some(ids) = &candidates {
        let tx_stmt = "INSERT OR IGNORE INTO candidate_ids (id) VALUES (?1)";
        let mut stmt = conn.prepare(tx_stmt)?;
        for id in ids {
            stmt.execute(params![id])?;
        }
    }

    let mut where_clauses: Vec<String> = Vec::new();
    let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(prefix) = &query.root_prefix {
        let (lower, upper) = subtree_range(prefix);
        where_clauses.push("(fe.path = ? OR (fe.path >= ? AND fe.path < ?))".to_string());
        bind.push(Box::new(prefix.clone()));
        bind.push(Box::new(lower));
        bind.push(Box::new(upper));
    }
    match query.file_type {
        FileTypeFilter::All => {}
        FileTypeFilter::File => {
            where_clauses.push("fe.kind = 'file'".to_string());
        }
        FileTypeFilter::Directory => {
            where_clauses.push("fe.kind = 'directory'".to_string());
        }
    }

    let from_clause = if using_candidates {
        "FROM file_entry fe JOIN candidate_ids c ON c.id = fe.id"
    } else {
        "FROM file_entry fe"
    };
    let where_sql =
        if where_clauses.is_empty() { String::new() } else { format!("WHERE {}", where_clauses.join(" AND ")) };

    let count_sql = format!("SELECT COUNT(*) {from_clause} {where_sql}");
    let total_results: i64 = {
        let mut stmt = conn.prepare(&count_sql)?;
        stmt.query_row(rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())), |r| r.get(0))?
    };

    let direction = if query.ascending { "ASC" } else { "DESC" };
    let order_sql = format!("ORDER BY fe.{} {direction}, fe.id ASC", query.sort.column());
    let page_sql = format!(
        "SELECT fe.id, fe.name, fe.path, fe.kind, fe.size, fe.mtime, fe.parent_path \
         {from_clause} {where_sql} {order_sql} LIMIT ? OFFSET ?"
    );
    let mut page_bind = bind;
    page_bind.push(Box::new(query.count as i64));
    page_bind.push(Box::new(query.offset as i64));

    let mut stmt = conn.prepare(&page_sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(page_bind.iter().map(|b| b.as_ref())), |r| {
        let kind_str: String = r.get(3)?;
        Ok(FileEntry {
            id: r.get(0)?,
            name: r.get(1)?,
            path: r.get(2)?,
            kind: FileKind::from_db_str(&kind_str).unwrap_or(FileKind::File),
            size: r.get(4)?,
            mtime: r.get(5)?,
            parent_path: r.get(6)?,
        })
    })?;

    let results: Vec<SearchResultItem> =
        rows.collect::<std::result::Result<Vec<FileEntry>, _>>()?.into_iter().map(Into::into).collect();

    Ok(SearchResults { total_results, results })
}

// ---------------------------------------------------------------------------
// WatchRoot persistence
// ---------------------------------------------------------------------------

impl Store {
    pub fn upsert_watch_root(&self, path: &str, status: RootStatus) -> Result<WatchRoot> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO watch_root (path, enabled, status) VALUES (?1, 1, ?2)
             ON CONFLICT(path) DO UPDATE SET status = excluded.status",
            params![path, status.as_db_str()],
        )?;
        self.get_watch_root(path)?.ok_or_else(|| {
            CoreError::StoreCorruption(format!("watch_root row for {path} missing after upsert"))
        })
    }

    pub fn get_watch_root(&self, path: &str) -> Result<Option<WatchRoot>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, path, enabled, status, total_files, indexed_files, last_full_scan, last_updated, error_message
             FROM watch_root WHERE path = ?1",
            params![path],
            row_to_watch_root,
        )
        .optional()
        .map_err(CoreError::from)
    }

    pub fn list_watch_roots(&self) -> Result<Vec<WatchRoot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, enabled, status, total_files, indexed_files, last_full_scan, last_updated, error_message
             FROM watch_root ORDER BY path ASC",
        )?;
        let rows = stmt.query_map([], row_to_watch_root)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn set_root_status(&self, path: &str, status: RootStatus, error_message: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE watch_root SET status = ?1, error_message = ?2, last_updated = ?3 WHERE path = ?4",
            params![status.as_db_str(), error_message, now(), path],
        )?;
        Ok(())
    }

    pub fn record_scan_complete(&self, path: &str, total_files: u64, indexed_files: u64) -> Result<()> {
        let conn = self.conn()?;
        let ts = now();
        conn.execute(
            "UPDATE watch_root SET status = 'watching', total_files = ?1, indexed_files = ?2,
                last_full_scan = ?3, last_updated = ?3, error_message = NULL WHERE path = ?4",
            params![total_files, indexed_files, ts, path],
        )?;
        Ok(())
    }

    pub fn delete_watch_root(&self, path: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM watch_root WHERE path = ?1", params![path])?;
        Ok(())
    }

    // -------------------------------------------------------------
    // IgnorePattern persistence
    // -------------------------------------------------------------

    pub fn list_ignores(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT pattern FROM ignore_pattern ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn add_ignore(&self, pattern: &str) -> Result<()> {
        let conn = self.conn()?;
        let next_seq: i64 =
            conn.query_row("SELECT COALESCE(MAX(seq), -1) + 1 FROM ignore_pattern", [], |r| r.get(0))?;
        conn.execute(
            "INSERT OR IGNORE INTO ignore_pattern (pattern, seq) VALUES (?1, ?2)",
            params![pattern, next_seq],
        )?;
        Ok(())
    }

    pub fn remove_ignore(&self, pattern: &str) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute("DELETE FROM ignore_pattern WHERE pattern = ?1", params![pattern])?;
        Ok(affected > 0)
    }

    pub fn add_default_ignores(&self) -> Result<()> {
        for pattern in crate::ignore::DEFAULT_IGNORES {
            self.add_ignore(pattern)?;
        }
        Ok(())
    }
}

fn row_to_watch_root(r: &rusqlite::Row<'_>) -> rusqlite::Result<WatchRoot> {
    let status_str: String = r.get(3)?;
    Ok(WatchRoot {
        id: r.get(0)?,
        path: r.get(1)?,
        enabled: r.get::<_, i64>(2)? != 0,
        status: RootStatus::from_db_str(&status_str),
        total_files: r.get(4)?,
        indexed_files: r.get(5)?,
        last_full_scan: r.get(6)?,
        last_updated: r.get(7)?,
        error_message: r.get(8)?,
    })
}

fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, kind: FileKind) -> NewFileEntry {
        NewFileEntry {
            name: name_of(path),
            path: path.to_string(),
            kind,
            size: if kind == FileKind::Directory { 0 } else { 123 },
            mtime: 1000.0,
            parent_path: parent_of(path),
        }
    }

    #[test]
    fn upsert_then_search_by_each_tier() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_many(&[
                entry("/root/alpha.txt", FileKind::File),
                entry("/root/beta.md", FileKind::File),
                entry("/root/gamma", FileKind::Directory),
            ])
            .unwrap();
        assert_eq!(store.count().unwrap(), 3);

        let mut q = SearchQuery { query: "al".into(), ..Default::default() };
        let res = store.search(&q).unwrap();
        assert_eq!(res.total_results, 1);
        assert_eq!(res.results[0].name, "alpha.txt");

        q.query = "a".into();
        let res = store.search(&q).unwrap();
        // "a" (len 1, LIKE fallback) hits alpha.txt, gamma, and the "root" path itself (path contains "a"? no).
        assert!(res.results.iter().any(|r| r.name == "alpha.txt"));
        assert!(res.results.iter().any(|r| r.name == "gamma"));
    }

    #[test]
    fn three_tier_lookup_all_find_the_same_entry() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_many(&[entry("/root/申告書.pdf", FileKind::File)]).unwrap();

        for q in ["申", "申告", "申告書"] {
            let query = SearchQuery { query: q.into(), ..Default::default() };
            let res = store.search(&query).unwrap();
            assert_eq!(res.total_results, 1, "query {q:?} should find the entry");
            assert_eq!(res.results[0].name, "申告書.pdf");
        }
    }

    #[test]
    fn delete_path_removes_fts_and_bigrams() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_many(&[entry("/root/alpha.txt", FileKind::File)]).unwrap();
        assert!(store.delete_path("/root/alpha.txt").unwrap());
        assert_eq!(store.count().unwrap(), 0);

        let query = SearchQuery { query: "al".into(), ..Default::default() };
        let res = store.search(&query).unwrap();
        assert_eq!(res.total_results, 0);
    }

    #[test]
    fn delete_subtree_removes_prefix_and_descendants_only() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_many(&[
                entry("/root/sub", FileKind::Directory),
                entry("/root/sub/a.txt", FileKind::File),
                entry("/root/sub/b.txt", FileKind::File),
                entry("/root/subsequent.txt", FileKind::File),
            ])
            .unwrap();
        let removed = store.delete_subtree("/root/sub").unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.count().unwrap(), 1); // subsequent.txt survives (prefix, not subtree member)
    }

    #[test]
    fn rename_cascades_to_descendants() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_many(&[
                entry("/a", FileKind::Directory),
                entry("/a/x.txt", FileKind::File),
                entry("/a/y.txt", FileKind::File),
            ])
            .unwrap();
        let touched = store.rename("/a", "/b").unwrap();
        assert_eq!(touched, 3);

        let conn = store.conn().unwrap();
        let count_old: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_entry WHERE path LIKE '/a/%'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count_old, 0);
        let count_new: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_entry WHERE path LIKE '/b/%'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count_new, 2);
    }

    #[test]
    fn upsert_is_idempotent_by_path() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_many(&[entry("/root/alpha.txt", FileKind::File)]).unwrap();
        let mut updated = entry("/root/alpha.txt", FileKind::File);
        updated.size = 999;
        store.upsert_many(&[updated]).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let query = SearchQuery { query: "alpha".into(), ..Default::default() };
        let res = store.search(&query).unwrap();
        assert_eq!(res.results[0].size, 999);
    }

    #[test]
    fn space_separated_tokens_and_across_plans() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_many(&[
                entry("/root/ab_report.txt", FileKind::File),
                entry("/root/report_only.txt", FileKind::File),
                entry("/root/ab_only.txt", FileKind::File),
            ])
            .unwrap();
        let query = SearchQuery { query: "ab report".into(), ..Default::default() };
        let res = store.search(&query).unwrap();
        assert_eq!(res.total_results, 1);
        assert_eq!(res.results[0].name, "ab_report.txt");
    }

    #[test]
    fn ignore_pattern_persistence_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.add_default_ignores().unwrap();
        let patterns = store.list_ignores().unwrap();
        assert!(patterns.contains(&"node_modules".to_string()));
        assert!(store.remove_ignore("node_modules").unwrap());
        assert!(!store.list_ignores().unwrap().contains(&"node_modules".to_string()));
    }

    #[test]
    fn open_seeds_default_ignores_only_on_a_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.db");

        let store = Store::open(&db_path, 64).unwrap();
        assert!(store.list_ignores().unwrap().contains(&"node_modules".to_string()));
        assert!(store.remove_ignore("node_modules").unwrap());
        drop(store);

        // Reopening the same (now-existing) file must not re-seed a pattern
        // the user explicitly removed.
        let reopened = Store::open(&db_path, 64).unwrap();
        assert!(!reopened.list_ignores().unwrap().contains(&"node_modules".to_string()));
    }

    // These two tests open the same fixed on-disk path (rather than a fresh
    // `tempdir()` per test) to exercise WAL-mode reopen behavior; `#[serial]`
    // keeps them from racing on that shared file when the test binary runs
    // tests concurrently.
    fn shared_fixture_path() -> std::path::PathBuf {
        std::env::temp_dir().join("everysearch-core-store-shared-fixture.db")
    }

    #[test]
    #[serial_test::serial(shared_store_fixture)]
    fn file_backed_store_persists_rows_across_reopen() {
        let path = shared_fixture_path();
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));

        {
            let store = Store::open(&path, 64).unwrap();
            store.upsert_many(&[entry("/root/alpha.txt", FileKind::File)]).unwrap();
        }
        let reopened = Store::open(&path, 64).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    #[serial_test::serial(shared_store_fixture)]
    fn file_backed_store_starts_clean_when_fixture_removed_first() {
        let path = shared_fixture_path();
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));

        let store = Store::open(&path, 64).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
