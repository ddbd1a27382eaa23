//! everysearch-server — the Everything-compatible HTTP query surface over
//! [`everysearch_core`]. Out of scope per spec §1; implemented here only to
//! the extent §6 specifies the wire contract (see SPEC_FULL.md §0, §6).

pub mod api;
pub mod config;

pub use api::AppContext;
pub use config::Config;
