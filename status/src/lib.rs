//! Read-mostly HTTP surface reporting the state of every source instance.
//!
//! The status board probes instances on its own schedule. Nothing here feeds back
//! into reconciliation.

pub mod api;
pub mod config;
pub mod metrics_defs;
pub mod state;

use api::AppState;
use reconciler::{Instances, StoreAdapter};
use state::StatusBoard;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum StatusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid listener: {0}")]
    Listener(#[from] config::ListenerError),
}

/// Starts the background probe and serves the status API until the listener fails.
pub async fn serve(
    config: config::Config,
    reconciler_config: &reconciler::Config,
    instances: Instances,
    store: Arc<dyn StoreAdapter>,
) -> Result<(), StatusError> {
    config.listener.validate()?;

    let board = StatusBoard::new(instances, &reconciler_config.servers);

    let updater = board.clone();
    let every = Duration::from_secs(config.refresh_every_secs.max(1));
    tokio::spawn(async move {
        updater.run_updater(every).await;
    });

    let app = api::router(AppState {
        board,
        store,
        config: Arc::new(reconciler_config.redacted()),
    });

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr, "Status API listening");

    axum::serve(listener, app).await?;
    Ok(())
}
