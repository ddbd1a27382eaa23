//! Value types shared across Store, Scanner, Watcher, and Coordinator —
//! the data model from spec §3 plus the search/status projections from §6.

use std::path::Path;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FileEntry (spec §3.1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

impl FileKind {
    pub fn as_db_str(self) -> &'static str {
        match self {
            FileKind::File => "file",
            FileKind::Directory => "directory",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "file" => Some(FileKind::File),
            "directory" => Some(FileKind::Directory),
            _ => None,
        }
    }

    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        if meta.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        }
    }
}

/// A FileEntry ready to be written — the Store assigns `id` on insert.
#[derive(Debug, Clone)]
pub struct NewFileEntry {
    pub name: String,
    pub path: String,
    pub kind: FileKind,
    pub size: u64,
    pub mtime: f64,
    pub parent_path: Option<String>,
}

impl NewFileEntry {
    pub fn from_path(abs_path: &Path, parent_path: Option<String>) -> std::io::Result<Self> {
        let meta = std::fs::symlink_metadata(abs_path)?;
        Self::from_path_and_metadata(abs_path, &meta, parent_path)
    }

    pub fn from_path_and_metadata(
        abs_path: &Path,
        meta: &std::fs::Metadata,
        parent_path: Option<String>,
    ) -> std::io::Result<Self> {
        let kind = FileKind::from_metadata(meta);
        let name = abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| abs_path.to_string_lossy().into_owned());
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let size = if kind == FileKind::Directory { 0 } else { meta.len() };
        Ok(Self { name, path: normalize_path(abs_path), kind, size, mtime, parent_path })
    }
}

/// One indexed filesystem object, as returned by search.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub kind: FileKind,
    pub size: u64,
    pub mtime: f64,
    pub parent_path: Option<String>,
}

/// Normalize to an absolute, separator-canonical (forward-slash) path string.
/// Does not touch the filesystem (no symlink resolution) — the scanner never
/// follows symlinks, so the path it observes is already the one to index.
pub fn normalize_path(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

pub fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        Some("/".to_string())
    } else {
        Some(trimmed[..idx].to_string())
    }
}

pub fn name_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

// ---------------------------------------------------------------------------
// WatchRoot (spec §3.1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootStatus {
    Idle,
    Scanning,
    Watching,
    Error,
}

impl RootStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            RootStatus::Idle => "idle",
            RootStatus::Scanning => "scanning",
            RootStatus::Watching => "watching",
            RootStatus::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "scanning" => RootStatus::Scanning,
            "watching" => RootStatus::Watching,
            "error" => RootStatus::Error,
            _ => RootStatus::Idle,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchRoot {
    pub id: i64,
    pub path: String,
    pub enabled: bool,
    pub status: RootStatus,
    pub total_files: u64,
    pub indexed_files: u64,
    pub last_full_scan: Option<f64>,
    pub last_updated: Option<f64>,
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Search (spec §4.1, §6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    Path,
    Size,
    DateModified,
}

impl SortKey {
    pub fn column(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Path => "path",
            SortKey::Size => "size",
            SortKey::DateModified => "mtime",
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileTypeFilter {
    All,
    File,
    Directory,
}

impl Default for FileTypeFilter {
    fn default() -> Self {
        FileTypeFilter::All
    }
}

pub const DEFAULT_SEARCH_COUNT: usize = 100;
pub const MAX_SEARCH_COUNT: usize = 10_000;

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub root_prefix: Option<String>,
    pub file_type: FileTypeFilter,
    pub sort: SortKey,
    pub ascending: bool,
    pub offset: usize,
    pub count: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            root_prefix: None,
            file_type: FileTypeFilter::default(),
            sort: SortKey::default(),
            ascending: true,
            offset: 0,
            count: DEFAULT_SEARCH_COUNT,
        }
    }
}

impl SearchQuery {
    /// Clamp `count` to the documented maximum (spec §6: "max 10000").
    pub fn clamped(mut self) -> Self {
        self.count = self.count.min(MAX_SEARCH_COUNT);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub size: u64,
    pub date_modified: f64,
}

impl From<FileEntry> for SearchResultItem {
    fn from(e: FileEntry) -> Self {
        Self { name: e.name, path: e.path, kind: e.kind, size: e.size, date_modified: e.mtime }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    #[serde(rename = "totalResults")]
    pub total_results: i64,
    pub results: Vec<SearchResultItem>,
}

// ---------------------------------------------------------------------------
// Status projection (spec §4.4)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RootStatusView {
    pub id: i64,
    pub path: String,
    pub enabled: bool,
    pub status: RootStatus,
    pub total_files: u64,
    pub indexed_files: u64,
    pub last_full_scan: Option<f64>,
    pub last_updated: Option<f64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub ready: bool,
    pub roots: Vec<RootStatusView>,
    pub total_indexed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_root_level_path() {
        assert_eq!(parent_of("/alpha.txt"), Some("/".to_string()));
        assert_eq!(parent_of("/a/b/c.txt"), Some("/a/b".to_string()));
        assert_eq!(parent_of("/"), None);
    }

    #[test]
    fn name_of_strips_trailing_separator() {
        assert_eq!(name_of("/a/b/c"), "c");
        assert_eq!(name_of("/a/b/c/"), "c");
    }
}
