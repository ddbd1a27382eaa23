//! The Coordinator (spec §4.4): owns the set of WatchRoots, drives their
//! scan→watch lifecycle, and is the single entry point the HTTP and admin
//! collaborators talk to. Every other module in this crate is private to the
//! Coordinator's implementation; callers only ever see `Coordinator`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::error::{CoreError, Result};
use crate::ignore::{IgnoreRegistry, IgnoreSet};
use crate::scanner::{self, ScanConfig, ScanProgress};
use crate::store::Store;
use crate::types::{
    normalize_path, RootStatus, RootStatusView, SearchQuery, SearchResults, StatusView, WatchRoot,
};
use crate::watcher::{self, RescanRequest, RescanSink, RootWatcher};

/// Live, in-memory state for one active root — distinct from its persisted
/// `watch_root` row, which the Store owns. Dropping this stops the root's
/// watcher and lets any in-flight scan observe cancellation.
struct RootHandle {
    progress: Arc<ScanProgress>,
    watcher: std::sync::Mutex<Option<RootWatcher>>,
}

pub struct Coordinator {
    store: Store,
    ignores: IgnoreRegistry,
    scan_config: ScanConfig,
    roots: DashMap<String, Arc<RootHandle>>,
    /// Lets `&self` methods hand a background thread an owned `Arc<Self>`
    /// without requiring callers to hold one (arbitrary `self: &Arc<Self>`
    /// receivers aren't stable Rust, so the Coordinator keeps a `Weak` back
    /// to its own `Arc` instead, set up via `Arc::new_cyclic`).
    self_ref: Weak<Coordinator>,
}

impl Coordinator {
    /// Open (or create) the index at `db_path` and recover any WatchRoots
    /// persisted from a previous run — each resumes scanning from scratch
    /// (spec doesn't require resuming a partial scan; a restart always
    /// re-establishes watch state cleanly) and then starts watching.
    pub fn open(db_path: &Path, scan_config: ScanConfig) -> Result<Arc<Self>> {
        let store = Store::open(db_path, scan_config.batch_size)?;
        let patterns = store.list_ignores()?;
        let ignores = IgnoreRegistry::new(IgnoreSet::compile(patterns)?);

        let coordinator = Arc::new_cyclic(|weak| Self {
            store,
            ignores,
            scan_config,
            roots: DashMap::new(),
            self_ref: weak.clone(),
        });

        for root in coordinator.store.list_watch_roots()? {
            if !root.enabled {
                continue;
            }
            let path = PathBuf::from(&root.path);
            if !path.is_dir() {
                warn!(path = %root.path, "recovered root no longer exists on disk, marking error");
                coordinator.store.set_root_status(
                    &root.path,
                    RootStatus::Error,
                    Some("root path no longer exists"),
                )?;
                continue;
            }
            coordinator.activate_root(path)?;
        }

        Ok(coordinator)
    }

    #[cfg(test)]
    pub fn open_in_memory(scan_config: ScanConfig) -> Result<Arc<Self>> {
        let store = Store::open_in_memory()?;
        let ignores = IgnoreRegistry::new(IgnoreSet::compile(store.list_ignores()?)?);
        Ok(Arc::new_cyclic(|weak| Self {
            store,
            ignores,
            scan_config,
            roots: DashMap::new(),
            self_ref: weak.clone(),
        }))
    }

    fn arc(&self) -> Arc<Self> {
        self.self_ref.upgrade().expect("coordinator dropped while one of its own operations was in flight")
    }

    // -----------------------------------------------------------------
    // Root lifecycle (spec §4.4)
    // -----------------------------------------------------------------

    pub fn add_root(&self, path: &Path) -> Result<WatchRoot> {
        if !path.is_dir() {
            return Err(CoreError::InvalidInput(format!("{} is not a directory", path.display())));
        }
        let normalized = normalize_path(path);
        self.reject_if_nested(&normalized)?;

        let row = self.store.upsert_watch_root(&normalized, RootStatus::Scanning)?;
        self.activate_root(PathBuf::from(&normalized))?;
        Ok(row)
    }

    /// Check every other active root for an overlap with `candidate`
    /// (equal, ancestor, or descendant) — spec §4.4: "no nested roots".
    fn reject_if_nested(&self, candidate: &str) -> Result<()> {
        for existing in self.store.list_watch_roots()? {
            if paths_overlap(candidate, &existing.path) {
                return Err(CoreError::NestedRoot {
                    new: PathBuf::from(candidate),
                    existing: PathBuf::from(existing.path),
                });
            }
        }
        Ok(())
    }

    /// Insert the in-memory handle, then spawn the initial scan and the
    /// watcher it hands off to on completion.
    fn activate_root(&self, root: PathBuf) -> Result<()> {
        let progress = ScanProgress::new();
        let handle = Arc::new(RootHandle { progress: Arc::clone(&progress), watcher: std::sync::Mutex::new(None) });
        let normalized = normalize_path(&root);
        self.roots.insert(normalized.clone(), Arc::clone(&handle));

        let coordinator = self.arc();
        std::thread::spawn(move || {
            coordinator.run_initial_scan_and_watch(root, handle);
        });
        Ok(())
    }

    /// Subscribe the `notify` watcher *before* running the initial scan, then
    /// run the scan, then record completion. Subscribing first closes the gap
    /// spec §5 ordering guarantee (a) forbids: "no event is lost between
    /// {scan completes → watcher starts} because the Watcher is subscribed
    /// before the final scan-commit barrier." Events that arrive while the
    /// scan is still running are applied to the Store concurrently with the
    /// scan's own upserts — safe, because every Store write (upsert/delete/
    /// rename) is an idempotent, independently-transacted operation.
    fn run_initial_scan_and_watch(self: Arc<Self>, root: PathBuf, handle: Arc<RootHandle>) {
        let normalized = normalize_path(&root);

        if let Err(err) = self.subscribe_watcher(root.clone(), &handle) {
            error!(root = %normalized, error = %err, "failed to start watcher");
            let _ = self.store.set_root_status(&normalized, RootStatus::Error, Some(&err.to_string()));
            return;
        }

        let ignores = self.ignores.current();
        let result = scanner::scan_root(
            &root,
            &self.store,
            Arc::clone(&ignores),
            Arc::clone(&handle.progress),
            &self.scan_config,
        );

        match result {
            Ok(()) => {
                let total = handle.progress.total_files();
                let indexed = handle.progress.indexed_files();
                if let Err(err) = self.store.record_scan_complete(&normalized, total, indexed) {
                    error!(root = %normalized, error = %err, "failed to record scan completion");
                }
                info!(root = %normalized, "root is now watching");
            }
            Err(err) => {
                error!(root = %normalized, error = %err, "initial scan failed");
                let _ = self.store.set_root_status(&normalized, RootStatus::Error, Some(&err.to_string()));
                *handle.watcher.lock().unwrap() = None;
            }
        }
    }

    /// Start the `notify` watcher for `root` and install it on `handle`.
    /// Does not touch `WatchRoot.status` — the caller decides when the root
    /// is considered "watching" (`record_scan_complete` does that once the
    /// initial scan finishes).
    fn subscribe_watcher(&self, root: PathBuf, handle: &Arc<RootHandle>) -> Result<()> {
        let sink: Arc<dyn RescanSink> =
            Arc::new(CoordinatorSink { coordinator: self.arc(), root: root.clone() });
        let watcher = RootWatcher::start(root, self.store.clone(), self.ignores.clone(), sink)?;
        *handle.watcher.lock().unwrap() = Some(watcher);
        Ok(())
    }

    pub fn remove_root(&self, path: &Path) -> Result<()> {
        let normalized = normalize_path(path);
        self.store
            .get_watch_root(&normalized)?
            .ok_or_else(|| CoreError::RootNotFound(PathBuf::from(&normalized)))?;

        // Dropping the handle stops the watcher (its `notify` instance and
        // debounce thread) and lets any in-flight scan see cancellation next
        // time it checks `ScanProgress`.
        if let Some((_, handle)) = self.roots.remove(&normalized) {
            handle.progress.cancel();
        }
        self.store.clear_root(&normalized)?;
        self.store.delete_watch_root(&normalized)?;
        Ok(())
    }

    /// Rebuild a named root, or every root if `path` is `None`.
    pub fn rebuild(&self, path: Option<&Path>) -> Result<()> {
        let targets: Vec<String> = match path {
            Some(p) => vec![normalize_path(p)],
            None => self.store.list_watch_roots()?.into_iter().map(|r| r.path).collect(),
        };
        for target in targets {
            self.rebuild_one(&target)?;
        }
        Ok(())
    }

    fn rebuild_one(&self, root_path: &str) -> Result<()> {
        self.store
            .get_watch_root(root_path)?
            .ok_or_else(|| CoreError::RootNotFound(PathBuf::from(root_path)))?;

        if let Some(existing) = self.roots.get(root_path) {
            existing.progress.cancel();
        }
        self.store.clear_root(root_path)?;
        self.store.set_root_status(root_path, RootStatus::Scanning, None)?;

        let root = PathBuf::from(root_path);
        self.activate_root(root)
    }

    // -----------------------------------------------------------------
    // Search & status (spec §4.4, §6)
    // -----------------------------------------------------------------

    pub fn search(&self, query: SearchQuery) -> Result<SearchResults> {
        self.store.search(&query.clamped())
    }

    pub fn status(&self) -> Result<StatusView> {
        let roots = self.store.list_watch_roots()?;
        let ready = !roots.is_empty() && roots.iter().all(|r| r.status != RootStatus::Scanning);
        let total_indexed = self.store.count()? as u64;
        let views = roots
            .into_iter()
            .map(|r| RootStatusView {
                id: r.id,
                path: r.path,
                enabled: r.enabled,
                status: r.status,
                total_files: r.total_files,
                indexed_files: r.indexed_files,
                last_full_scan: r.last_full_scan,
                last_updated: r.last_updated,
                error_message: r.error_message,
            })
            .collect();
        Ok(StatusView { ready, roots: views, total_indexed })
    }

    pub fn list_roots(&self) -> Result<Vec<WatchRoot>> {
        self.store.list_watch_roots()
    }

    // -----------------------------------------------------------------
    // Ignore pattern administration (spec §6)
    // -----------------------------------------------------------------

    pub fn list_ignores(&self) -> Result<Vec<String>> {
        self.store.list_ignores()
    }

    pub fn add_ignore(&self, pattern: &str) -> Result<()> {
        self.store.add_ignore(pattern)?;
        self.republish_ignores()
    }

    pub fn remove_ignore(&self, pattern: &str) -> Result<bool> {
        let removed = self.store.remove_ignore(pattern)?;
        self.republish_ignores()?;
        Ok(removed)
    }

    pub fn add_default_ignores(&self) -> Result<()> {
        self.store.add_default_ignores()?;
        self.republish_ignores()
    }

    fn republish_ignores(&self) -> Result<()> {
        let patterns = self.store.list_ignores()?;
        self.ignores.publish(IgnoreSet::compile(patterns)?);
        Ok(())
    }
}

/// Bridges `Watcher`'s rescan requests back into the Coordinator's scanner
/// pool, running them on their own background thread so the Watcher's
/// debounce loop is never blocked by a rescan.
struct CoordinatorSink {
    coordinator: Arc<Coordinator>,
    root: PathBuf,
}

impl RescanSink for CoordinatorSink {
    fn request(&self, req: RescanRequest) {
        match req {
            RescanRequest::Shallow(dir) => {
                let store = self.coordinator.store.clone();
                let ignores = self.coordinator.ignores.current();
                let config = self.coordinator.scan_config;
                std::thread::spawn(move || {
                    if let Err(err) = watcher::run_shallow_rescan(&dir, &store, ignores, &config) {
                        error!(dir = %dir.display(), error = %err, "shallow rescan failed");
                    }
                });
            }
            RescanRequest::Full => {
                let coordinator = Arc::clone(&self.coordinator);
                let root = self.root.clone();
                std::thread::spawn(move || {
                    let normalized = normalize_path(&root);
                    warn!(root = %normalized, "running full rescan after notification overflow");
                    if let Err(err) = coordinator.store.clear_root(&normalized) {
                        error!(root = %normalized, error = %err, "failed to clear root before full rescan");
                        return;
                    }
                    if let Some(handle) = coordinator.roots.get(&normalized) {
                        let progress = ScanProgress::new();
                        // Replace the handle's progress counters so `status()`
                        // reflects the rescan rather than the stale original.
                        let new_handle = Arc::new(RootHandle {
                            progress: Arc::clone(&progress),
                            watcher: std::sync::Mutex::new(handle.watcher.lock().unwrap().take()),
                        });
                        drop(handle);
                        coordinator.roots.insert(normalized.clone(), new_handle);
                        let ignores = coordinator.ignores.current();
                        if let Err(err) =
                            scanner::scan_root(&root, &coordinator.store, ignores, progress, &coordinator.scan_config)
                        {
                            error!(root = %normalized, error = %err, "full rescan failed");
                        }
                    }
                });
            }
        }
    }
}

fn paths_overlap(a: &str, b: &str) -> bool {
    a == b || a.starts_with(&format!("{b}/")) || b.starts_with(&format!("{a}/"))
}
