//! everysearchd — thin CLI/HTTP shell over the [`everysearch_server`] library
//! crate, matching the teacher's split of "CLI parsing + router assembly in
//! `main.rs`, handlers in `api.rs`" (see `TEACHER.txt`).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use everysearch_core::Coordinator;
use everysearch_server::api::AppContext;
use everysearch_server::config::{load_config_file, Config};

/// everysearchd — Everything-compatible local filesystem search server.
#[derive(Parser)]
#[command(name = "everysearchd", version, about, long_about = None)]
struct Cli {
    /// Bind address (default 127.0.0.1; overrides config file / env)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (default: first free port starting at 8721)
    #[arg(long)]
    port: Option<u16>,

    /// Path to the index database file
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Path to a TOML config file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Watch root to add on startup if not already present (repeatable)
    #[arg(long = "root", value_name = "PATH")]
    roots: Vec<PathBuf>,
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down...");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("everysearch=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let file_config = load_config_file(cli.config.as_deref()).unwrap_or_else(|e| {
        error!(error = %e, "failed to load config file");
        std::process::exit(1);
    });
    let mut config = Config::resolve(file_config);
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if cli.port.is_some() {
        config.port = cli.port;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    if let Some(parent) = config.db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!(dir = %parent.display(), error = %e, "failed to create index directory");
            std::process::exit(1);
        }
    }

    let coordinator = Coordinator::open(&config.db_path, config.scan).unwrap_or_else(|e| {
        error!(db_path = %config.db_path.display(), error = %e, "failed to open index store");
        std::process::exit(1);
    });

    for root in &cli.roots {
        let root = root.canonicalize().unwrap_or_else(|e| {
            error!(path = %root.display(), error = %e, "root path not found");
            std::process::exit(1);
        });
        match coordinator.add_root(&root) {
            Ok(_) => info!(root = %root.display(), "added watch root"),
            Err(e) => error!(root = %root.display(), error = %e, "failed to add watch root"),
        }
    }

    let ctx = AppContext { coordinator: Arc::clone(&coordinator), start_time: std::time::Instant::now() };

    let app = everysearch_server::api::router(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let bind_addr = config.bind.clone();
    let listener = if let Some(port) = config.port {
        tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await.unwrap_or_else(|e| {
            error!(port = port, error = %e, "could not bind to port");
            std::process::exit(1);
        })
    } else {
        const BASE: u16 = 8721;
        const RANGE: u16 = 10;
        let mut found = None;
        for port in BASE..BASE + RANGE {
            if let Ok(l) = tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await {
                found = Some(l);
                break;
            }
        }
        found.unwrap_or_else(|| {
            error!(range_start = BASE, range_end = BASE + RANGE - 1, "no free port found");
            std::process::exit(1);
        })
    };

    let port = listener.local_addr().unwrap().port();
    info!(bind = %bind_addr, port = port, db = %config.db_path.display(), "everysearchd listening");
    eprintln!("EVERYSEARCH_PORT={port}");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap();
}
