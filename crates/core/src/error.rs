//! Core error taxonomy.
//!
//! Transient conditions (a vanished directory, a busy SQLite writer, a racing
//! insert) are handled where they occur and never surface as a [`CoreError`];
//! see `WatchRoot.error_message` for those. This type is reserved for errors
//! that abort the operation the caller asked for.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Rejected at the admin boundary; no state mutation occurred.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A root path that equals, contains, or is contained by an already-active root.
    #[error("root {new} overlaps already-active root {existing}")]
    NestedRoot { new: PathBuf, existing: PathBuf },

    /// No WatchRoot matches the given path.
    #[error("no such root: {0}")]
    RootNotFound(PathBuf),

    /// The index file is corrupt or otherwise unreadable. Fatal: the caller
    /// should stop serving queries against this Store.
    #[error("index store corrupted: {0}")]
    StoreCorruption(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("filesystem watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidPattern { pattern: String, source: globset::Error },
}
