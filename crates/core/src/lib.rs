//! everysearch-core — the indexing and search engine behind everysearch, an
//! Everything-compatible local filesystem search service.
//!
//! The four components described by the design (Store, Scanner, Watcher,
//! Coordinator) live in their own modules; [`coordinator::Coordinator`] is
//! the crate's single public entry point for callers (the CLI and the HTTP
//! server both build one and talk to it exclusively).

pub mod coordinator;
pub mod error;
pub mod fold;
pub mod ignore;
pub mod scanner;
pub mod store;
pub mod types;
pub mod watcher;

pub use coordinator::Coordinator;
pub use error::{CoreError, Result};
pub use scanner::ScanConfig;
pub use types::{
    FileEntry, FileKind, FileTypeFilter, NewFileEntry, RootStatus, RootStatusView, SearchQuery,
    SearchResultItem, SearchResults, SortKey, StatusView, WatchRoot, DEFAULT_SEARCH_COUNT,
};
