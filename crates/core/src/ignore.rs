//! IgnorePattern set: leaf-name glob matching, published as copy-on-write
//! snapshots (spec §5: "additions/removals publish a new immutable snapshot
//! that future scanner/watcher operations read").

use std::sync::{Arc, RwLock};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{CoreError, Result};

/// Default ignore set populated on a fresh database (spec §6).
pub const DEFAULT_IGNORES: &[&str] = &[
    "node_modules",
    ".git",
    ".svn",
    "__pycache__",
    ".pytest_cache",
    ".venv",
    "venv",
    ".env",
    "dist",
    "build",
    ".next",
    ".DS_Store",
    "Thumbs.db",
];

/// An immutable, compiled snapshot of the active ignore patterns.
pub struct IgnoreSet {
    patterns: Vec<String>,
    matcher: GlobSet,
}

impl IgnoreSet {
    pub fn compile(patterns: Vec<String>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for p in &patterns {
            let glob = Glob::new(p)
                .map_err(|source| CoreError::InvalidPattern { pattern: p.clone(), source })?;
            builder.add(glob);
        }
        let matcher = builder
            .build()
            .map_err(|source| CoreError::InvalidPattern { pattern: patterns.join(","), source })?;
        Ok(Self { patterns, matcher })
    }

    pub fn empty() -> Self {
        Self { patterns: Vec::new(), matcher: GlobSetBuilder::new().build().unwrap() }
    }

    /// True if `name` (a bare leaf name, no path separators) matches any pattern.
    pub fn is_match(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Process-wide, copy-on-write handle to the active [`IgnoreSet`].
///
/// Readers (Scanner workers, the Watcher's debounce loop) call
/// [`IgnoreRegistry::current`] to get a cheap `Arc` clone of the latest
/// published snapshot; they never block a writer and a writer never blocks
/// them — publishing just swaps the inner `Arc`.
#[derive(Clone)]
pub struct IgnoreRegistry {
    inner: Arc<RwLock<Arc<IgnoreSet>>>,
}

impl IgnoreRegistry {
    pub fn new(initial: IgnoreSet) -> Self {
        Self { inner: Arc::new(RwLock::new(Arc::new(initial))) }
    }

    pub fn current(&self) -> Arc<IgnoreSet> {
        Arc::clone(&self.inner.read().unwrap())
    }

    pub fn publish(&self, set: IgnoreSet) {
        *self.inner.write().unwrap() = Arc::new(set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_literal_and_glob() {
        let set = IgnoreSet::compile(vec!["node_modules".into(), "*.tmp".into()]).unwrap();
        assert!(set.is_match("node_modules"));
        assert!(set.is_match("scratch.tmp"));
        assert!(!set.is_match("node_modules2"));
        assert!(!set.is_match("main.rs"));
    }

    #[test]
    fn registry_publishes_new_snapshot() {
        let reg = IgnoreRegistry::new(IgnoreSet::empty());
        assert!(!reg.current().is_match(".git"));
        reg.publish(IgnoreSet::compile(vec![".git".into()]).unwrap());
        assert!(reg.current().is_match(".git"));
    }

    #[test]
    fn default_ignores_cover_common_noise_dirs() {
        let set = IgnoreSet::compile(DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect()).unwrap();
        for name in ["node_modules", ".git", "dist", "build", ".DS_Store"] {
            assert!(set.is_match(name), "{name} should be ignored by default");
        }
        assert!(!set.is_match("src"));
    }
}
