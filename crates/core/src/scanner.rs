//! Parallel bulk directory traversal (spec §4.2): populates the Store from a
//! cold filesystem walk, honoring the active ignore set and reporting
//! progress through lock-free atomic counters the Coordinator can poll
//! without taking a lock.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ignore::{WalkBuilder, WalkState};
use tracing::{debug, warn};

use crate::error::Result;
use crate::ignore::IgnoreSet;
use crate::store::Store;
use crate::types::{parent_of, NewFileEntry};

/// Tunables for one scan. `worker_threads` mirrors the spec's "pool of N
/// worker threads (default 4)"; `batch_size` bounds how many rows a single
/// worker buffers before flushing to the Store.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub worker_threads: usize,
    pub batch_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { worker_threads: 4, batch_size: 512 }
    }
}

/// Lock-free progress counters for one in-flight (or completed) scan. Cheaply
/// shared via `Arc` between the Coordinator (reader) and the scan's worker
/// threads (writers).
#[derive(Debug, Default)]
pub struct ScanProgress {
    total_files: AtomicU64,
    indexed_files: AtomicU64,
    cancelled: AtomicBool,
}

impl ScanProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn total_files(&self) -> u64 {
        self.total_files.load(Ordering::Relaxed)
    }

    pub fn indexed_files(&self) -> u64 {
        self.indexed_files.load(Ordering::Relaxed)
    }

    /// Request the scan stop at the next batch boundary. Workers observe
    /// this between directory entries, not mid-batch (spec §5: "workers
    /// observe a cancellation flag between batches and exit cleanly").
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Buffers upserts for one worker thread; flushes on reaching `batch_size`
/// and once more on drop, so a scan's residual partial batch is never lost
/// (spec §4.2: "On termination the residual buffers are flushed").
struct BatchBuffer {
    store: Store,
    batch_size: usize,
    buf: Vec<NewFileEntry>,
}

impl BatchBuffer {
    fn push(&mut self, entry: NewFileEntry) {
        self.buf.push(entry);
        if self.buf.len() >= self.batch_size {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        if let Err(err) = self.store.upsert_many(&self.buf) {
            warn!(error = %err, batch_len = self.buf.len(), "failed to flush scan batch to store");
        }
        self.buf.clear();
    }
}

impl Drop for BatchBuffer {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Walk `root` in parallel, honoring `ignores` (a snapshot taken once at scan
/// start — an update published mid-scan takes effect on the *next* scan or
/// rebuild, not this one), streaming batches into `store`.
///
/// Never follows symlinks (spec §9: "symbolic-link loops are broken by not
/// following symlinks during scan").
pub fn scan_root(
    root: &Path,
    store: &Store,
    ignores: Arc<IgnoreSet>,
    progress: Arc<ScanProgress>,
    config: &ScanConfig,
) -> Result<()> {
    scan(root, store, ignores, progress, config, true)
}

/// Like [`scan_root`] but for a directory that is *not* a WatchRoot — its
/// `parent_path` is computed normally instead of left `null`. Used by the
/// Watcher to enqueue a shallow rescan of a newly-created directory without
/// treating it as a second root (spec §4.3).
pub fn scan_subtree(
    dir: &Path,
    store: &Store,
    ignores: Arc<IgnoreSet>,
    progress: Arc<ScanProgress>,
    config: &ScanConfig,
) -> Result<()> {
    scan(dir, store, ignores, progress, config, false)
}

fn scan(
    root: &Path,
    store: &Store,
    ignores: Arc<IgnoreSet>,
    progress: Arc<ScanProgress>,
    config: &ScanConfig,
    treat_as_root: bool,
) -> Result<()> {
    let filter_ignores = Arc::clone(&ignores);
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .follow_links(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .threads(config.worker_threads.max(1))
        .filter_entry(move |entry| {
            // The root entry itself (depth 0) is never subject to the ignore
            // test — only its descendants are.
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !filter_ignores.is_match(name.as_ref())
        })
        .build_parallel();

    walker.run(|| {
        let store = store.clone();
        let progress = Arc::clone(&progress);
        let batch_size = config.batch_size;
        let mut buffer = BatchBuffer { store, batch_size, buf: Vec::with_capacity(batch_size) };

        Box::new(move |entry| {
            if progress.is_cancelled() {
                return WalkState::Quit;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "scan: skipping unreadable entry");
                    return WalkState::Continue;
                }
            };

            let Some(file_type) = entry.file_type() else {
                return WalkState::Continue;
            };

            if file_type.is_dir() {
                progress.total_files.fetch_add(1, Ordering::Relaxed);
                // The root directory itself is also indexed as an entry.
            } else if !file_type.is_file() {
                // Symlinks and other non-file/dir objects are not indexed.
                return WalkState::Continue;
            }

            let path = entry.path();
            let parent = if treat_as_root { parent_for(path, root) } else { parent_of(&crate::types::normalize_path(path)) };
            let new_entry = match NewFileEntry::from_path(path, parent) {
                Ok(e) => e,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "scan: stat failed, skipping");
                    return WalkState::Continue;
                }
            };

            buffer.push(new_entry);
            progress.indexed_files.fetch_add(1, Ordering::Relaxed);

            WalkState::Continue
        })
    });

    Ok(())
}

/// Parent path for an entry discovered under `root`: `None` when the entry
/// *is* the root (a root's `parent_path` is null per spec §3.1), otherwise
/// the normalized parent directory.
fn parent_for(path: &Path, root: &Path) -> Option<String> {
    if path == root {
        None
    } else {
        parent_of(&crate::types::normalize_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::IgnoreSet;
    use crate::store::Store;
    use std::fs;

    #[test]
    fn scans_files_and_prunes_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.txt"), b"hi").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/junk.js"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/beta.md"), b"hi").unwrap();

        let store = Store::open_in_memory().unwrap();
        let ignores = Arc::new(IgnoreSet::compile(vec!["node_modules".into()]).unwrap());
        let progress = ScanProgress::new();
        scan_root(dir.path(), &store, ignores, Arc::clone(&progress), &ScanConfig::default()).unwrap();

        // root dir + alpha.txt + sub dir + sub/beta.md == 4 entries; node_modules pruned entirely.
        assert_eq!(store.count().unwrap(), 4);
        assert_eq!(progress.indexed_files(), 4);

        let query = crate::types::SearchQuery { query: "junk".into(), ..Default::default() };
        let res = store.search(&query).unwrap();
        assert_eq!(res.total_results, 0);
    }

    #[test]
    fn cancellation_stops_the_walk_early() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..50 {
            fs::write(dir.path().join(format!("file{i}.txt")), b"x").unwrap();
        }
        let store = Store::open_in_memory().unwrap();
        let progress = ScanProgress::new();
        progress.cancel();
        scan_root(
            dir.path(),
            &store,
            Arc::new(IgnoreSet::empty()),
            Arc::clone(&progress),
            &ScanConfig::default(),
        )
        .unwrap();
        assert!(store.count().unwrap() < 51);
    }
}
