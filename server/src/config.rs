//! Process configuration: bind address, index file location, and the scan/
//! search tunables exposed as knobs (spec §4.1's `batch_size`, §4.2's
//! `worker_threads`). Loaded from an optional TOML file plus environment
//! overrides, file values lowest precedence, env vars next, CLI flags last.

use std::path::PathBuf;

use everysearch_core::ScanConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub worker_threads: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Fully resolved configuration the server runs with.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: Option<u16>,
    pub db_path: PathBuf,
    pub scan: ScanConfig,
}

impl Config {
    /// Merge a parsed `ConfigFile` (lowest precedence) with environment
    /// variable overrides (`EVERYSEARCH_BIND`, `EVERYSEARCH_PORT`,
    /// `EVERYSEARCH_DB_PATH`) and CLI flags (highest precedence, applied by
    /// the caller after this returns).
    pub fn resolve(file: ConfigFile) -> Self {
        let bind = std::env::var("EVERYSEARCH_BIND").ok().or(file.bind).unwrap_or_else(|| "127.0.0.1".to_string());
        let port = std::env::var("EVERYSEARCH_PORT").ok().and_then(|p| p.parse().ok()).or(file.port);
        let db_path = std::env::var("EVERYSEARCH_DB_PATH")
            .ok()
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(default_db_path);
        let scan = ScanConfig {
            worker_threads: file.worker_threads.unwrap_or(4),
            batch_size: file.batch_size.unwrap_or(512),
        };
        Self { bind, port, db_path, scan }
    }
}

/// `~/.local/share/everysearch/index.db` (or platform equivalent via `dirs`),
/// falling back to `./everysearch-index.db` if no data directory is resolvable.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("everysearch").join("index.db"))
        .unwrap_or_else(|| PathBuf::from("everysearch-index.db"))
}

/// Load `path` as a TOML config file, or return the empty default if absent.
pub fn load_config_file(path: Option<&std::path::Path>) -> anyhow::Result<ConfigFile> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match dirs::config_dir() {
            Some(d) => d.join("everysearch").join("config.toml"),
            None => return Ok(ConfigFile::default()),
        },
    };
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
    let parsed: ConfigFile = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_defaults() {
        let cfg = Config::resolve(ConfigFile::default());
        assert_eq!(cfg.bind, "127.0.0.1");
        assert_eq!(cfg.scan.worker_threads, 4);
        assert_eq!(cfg.scan.batch_size, 512);
    }

    #[test]
    fn resolve_honors_file_values() {
        let file = ConfigFile {
            bind: Some("0.0.0.0".into()),
            port: Some(9000),
            db_path: Some(PathBuf::from("/tmp/idx.db")),
            worker_threads: Some(8),
            batch_size: Some(1024),
        };
        let cfg = Config::resolve(file);
        assert_eq!(cfg.bind, "0.0.0.0");
        assert_eq!(cfg.port, Some(9000));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/idx.db"));
        assert_eq!(cfg.scan.worker_threads, 8);
    }
}
