//! imgdrop server binary.
//!
//! Accepts JPEG/PNG uploads behind a shared-secret token, stores the bytes on
//! local disk and their metadata in SQLite, and serves a static frontend. The
//! main entry point loads configuration, opens both stores, and runs the Axum
//! router until a shutdown signal arrives.

mod app;
mod auth;
mod config;
mod error;
mod files;
mod frontend;
mod http;
mod images;
mod logging;
mod storage;
mod upload;

use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use crate::auth::AuthConfig;
use crate::config::Args;
use crate::images::SqliteImageStore;
use crate::storage::LocalBlobStore;

/// Starts the imgdrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        return Err(std::io::Error::other(format!("failed to load .env: {err}")));
    }

    let args = Args::parse();
    logging::init_logging(args.log_json);

    let auth_config = Arc::new(AuthConfig::new(args.token.clone())?);

    let blobs = LocalBlobStore::new(PathBuf::from(&args.upload_dir));
    blobs.ensure_root().await?;

    let images = SqliteImageStore::open(&PathBuf::from(&args.database), args.db_max_connections)
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    info!(database = args.database, upload_dir = args.upload_dir, "stores ready");

    let static_dir = PathBuf::from(&args.static_dir);
    if !static_dir.is_dir() {
        warn!(static_dir = args.static_dir, "static directory not found, only API routes will respond");
    }

    let app = app::build_router(auth_config, Arc::new(blobs), Arc::new(images), &static_dir);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("Running image server at {}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
