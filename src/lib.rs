//! REST API serving travel attractions partitioned by country.
//!
//! Every request downloads its country's SQLite snapshot from object storage,
//! queries it, inlines attraction images as base64 and deletes the local copy.

pub mod accounts;
pub mod attractions;
pub mod config;
pub mod dataset;
pub mod error;
pub mod images;
pub mod network;
pub mod routes;
pub mod sqlite;
pub mod storage;

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use log::{error, info};
use tokio::net::TcpListener;

use config::Config;
use error::Result;
use routes::{AppState, router};
use storage::{S3ObjectStore, SharedObjectStore};

/// Run the API server until interrupted.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the listener cannot bind or
/// the server fails.
pub async fn run() -> Result<()> {
    info!("Initializing server");
    let config = Config::from_env()?;

    let store: SharedObjectStore = Arc::new(S3ObjectStore::from_config(&config.s3).await);
    let state = AppState::new(config, store)?;

    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, state.config.port));
    let listener = TcpListener::bind(address).await?;
    info!("Server running on {}:{}", state.host, state.config.port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
