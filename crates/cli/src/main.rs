//! everysearch CLI — admin operations and search from a terminal.
//!
//! Calls `everysearch-core` directly with no server process involved, mirroring
//! the teacher's `cli/src/main.rs` shape: one `Cli` with a `#[command(subcommand)]`
//! and a global `--json` flag for machine-readable output.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use everysearch_core::{Coordinator, FileTypeFilter, ScanConfig, SearchQuery, SortKey};

/// everysearch CLI — search and administer a local filesystem index.
#[derive(Parser)]
#[command(name = "esearch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the index database file (default: platform data dir)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a directory as a monitored root and start scanning it
    AddRoot {
        /// Directory to monitor
        path: PathBuf,
    },
    /// Stop monitoring a root and drop its indexed entries
    RemoveRoot {
        /// Root directory previously added
        path: PathBuf,
    },
    /// Re-scan one root (or every root) from scratch
    Rebuild {
        /// Root directory to rebuild; omit to rebuild every root
        path: Option<PathBuf>,
    },
    /// List monitored roots
    Roots,
    /// Show per-root scan/watch status
    Status,
    /// Search the index
    Search {
        /// Query string (substring, case-insensitive; empty matches everything)
        #[arg(default_value = "")]
        query: String,

        /// Restrict results to entries under this path
        #[arg(long)]
        path: Option<String>,

        /// Restrict by kind
        #[arg(long, value_enum, default_value = "all")]
        file_type: FileTypeArg,

        /// Sort key
        #[arg(long, value_enum, default_value = "name")]
        sort: SortArg,

        /// Sort descending instead of ascending
        #[arg(long)]
        descending: bool,

        /// Skip this many results
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum results to return (capped at 10000)
        #[arg(long, default_value = "100")]
        count: usize,
    },
    /// List active ignore patterns
    Ignores,
    /// Add an ignore pattern (leaf-name literal or glob)
    AddIgnore {
        pattern: String,
    },
    /// Remove an ignore pattern
    RemoveIgnore {
        pattern: String,
    },
    /// Populate the default ignore set (node_modules, .git, etc.)
    AddDefaultIgnores,
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum FileTypeArg {
    All,
    File,
    Directory,
}

impl From<FileTypeArg> for FileTypeFilter {
    fn from(v: FileTypeArg) -> Self {
        match v {
            FileTypeArg::All => FileTypeFilter::All,
            FileTypeArg::File => FileTypeFilter::File,
            FileTypeArg::Directory => FileTypeFilter::Directory,
        }
    }
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum SortArg {
    Name,
    Path,
    Size,
    DateModified,
}

impl From<SortArg> for SortKey {
    fn from(v: SortArg) -> Self {
        match v {
            SortArg::Name => SortKey::Name,
            SortArg::Path => SortKey::Path,
            SortArg::Size => SortKey::Size,
            SortArg::DateModified => SortKey::DateModified,
        }
    }
}

/// `~/.local/share/everysearch/index.db` (or platform equivalent), falling
/// back to `./everysearch-index.db` if no data directory is resolvable.
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("everysearch").join("index.db"))
        .unwrap_or_else(|| PathBuf::from("everysearch-index.db"))
}

fn resolve_path(path: &std::path::Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|e| {
        eprintln!("error: {} not found: {e}", path.display());
        std::process::exit(1);
    })
}

fn open_coordinator(db_path: Option<PathBuf>) -> std::sync::Arc<Coordinator> {
    let db_path = db_path.unwrap_or_else(default_db_path);
    if let Some(parent) = db_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    Coordinator::open(&db_path, ScanConfig::default()).unwrap_or_else(|e| {
        eprintln!("error: failed to open index at {}: {e}", db_path.display());
        std::process::exit(1);
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("everysearch=warn".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let coordinator = open_coordinator(cli.db_path);

    match cli.command {
        Commands::AddRoot { path } => {
            let path = resolve_path(&path);
            match coordinator.add_root(&path) {
                Ok(root) => print_value(cli.json, &root, |r| println!("added root {} (scanning)", r.path)),
                Err(e) => fail(&e),
            }
        }
        Commands::RemoveRoot { path } => {
            let path = resolve_path(&path);
            match coordinator.remove_root(&path) {
                Ok(()) => {
                    if cli.json {
                        println!("{}", serde_json::json!({ "removed": true }));
                    } else {
                        println!("removed root {}", path.display());
                    }
                }
                Err(e) => fail(&e),
            }
        }
        Commands::Rebuild { path } => {
            let resolved = path.as_deref().map(resolve_path);
            match coordinator.rebuild(resolved.as_deref()) {
                Ok(()) => println!("rebuild started"),
                Err(e) => fail(&e),
            }
        }
        Commands::Roots => match coordinator.list_roots() {
            Ok(roots) => print_value(cli.json, &roots, |roots| {
                for r in roots {
                    println!("{:<50} {:<10} {}/{}", r.path, r.status.as_db_str(), r.indexed_files, r.total_files);
                }
            }),
            Err(e) => fail(&e),
        },
        Commands::Status => match coordinator.status() {
            Ok(status) => print_value(cli.json, &status, |s| {
                println!("ready: {}", s.ready);
                println!("total indexed: {}", s.total_indexed);
                for r in &s.roots {
                    println!("  {:<50} {:<10} {}", r.path, r.status.as_db_str(), r.error_message.as_deref().unwrap_or(""));
                }
            }),
            Err(e) => fail(&e),
        },
        Commands::Search { query, path, file_type, sort, descending, offset, count } => {
            let search_query = SearchQuery {
                query,
                root_prefix: path,
                file_type: file_type.into(),
                sort: sort.into(),
                ascending: !descending,
                offset,
                count,
            };
            match coordinator.search(search_query) {
                Ok(results) => print_value(cli.json, &results, |r| {
                    for item in &r.results {
                        println!("{:<60} {:>10}  {}", item.path, item.size, item.date_modified);
                    }
                    eprintln!("\n{} of {} results", r.results.len(), r.total_results);
                }),
                Err(e) => fail(&e),
            }
        }
        Commands::Ignores => match coordinator.list_ignores() {
            Ok(patterns) => print_value(cli.json, &patterns, |ps| {
                for p in ps {
                    println!("{p}");
                }
            }),
            Err(e) => fail(&e),
        },
        Commands::AddIgnore { pattern } => match coordinator.add_ignore(&pattern) {
            Ok(()) => println!("added ignore pattern {pattern:?}"),
            Err(e) => fail(&e),
        },
        Commands::RemoveIgnore { pattern } => match coordinator.remove_ignore(&pattern) {
            Ok(removed) => println!("{}", if removed { "removed" } else { "not found" }),
            Err(e) => fail(&e),
        },
        Commands::AddDefaultIgnores => match coordinator.add_default_ignores() {
            Ok(()) => println!("default ignore patterns added"),
            Err(e) => fail(&e),
        },
    }
}

fn print_value<T: serde::Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) {
    if json {
        println!("{}", serde_json::to_string_pretty(value).unwrap());
    } else {
        human(value);
    }
}

fn fail(err: &everysearch_core::CoreError) -> ! {
    eprintln!("error: {err}");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_canonicalizes_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_path(dir.path());
        assert!(resolved.is_absolute());
        assert_eq!(resolved, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn open_coordinator_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("index.db");
        let coordinator = open_coordinator(Some(db_path.clone()));
        assert!(db_path.parent().unwrap().is_dir());
        assert_eq!(coordinator.list_roots().unwrap().len(), 0);
    }
}
