//! # Synchro Worker
//!
//! Background worker for Synchro, responsible for draining the
//! notification outbox (email delivery) and running the invitation
//! reconciliation sweep.
//!
//! ## Architecture
//!
//! The worker:
//! - Polls the `notifications` collection for pending records
//! - Renders and delivers each one through the configured sender
//! - Marks records sent/failed with compare-and-swap, so multiple
//!   workers can share an outbox
//! - Periodically sweeps accepted invitations and replays any
//!   membership grant the accepting client failed to write
//!
//! ## Usage
//!
//! ```bash
//! STORE_URL=http://localhost:8080 cargo run -p synchro-worker
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synchro_core::store::http::HttpStore;
use synchro_core::store::DocumentStore;
use synchro_worker::config::WorkerConfig;
use synchro_worker::dispatcher::Dispatcher;
use synchro_worker::reconciler::Reconciler;
use synchro_worker::sender::{HttpSender, LogSender, NotificationSender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "synchro_worker=debug,synchro_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Synchro Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let mut store = HttpStore::new(config.store_url.clone());
    if let Some(key) = &config.store_api_key {
        store = store.with_api_key(key.clone());
    }
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let sender: Arc<dyn NotificationSender> = match &config.email_api_url {
        Some(url) => {
            let mut sender = HttpSender::new(url.clone(), config.email_from.clone());
            if let Some(key) = &config.email_api_key {
                sender = sender.with_api_key(key.clone());
            }
            Arc::new(sender)
        }
        None => {
            tracing::warn!("EMAIL_API_URL not set, emails will be logged instead of sent");
            Arc::new(LogSender::new())
        }
    };

    let dispatcher = Dispatcher::new(store.clone(), sender, config.dispatcher.clone());
    let reconciler = Reconciler::new(store).with_interval(config.reconcile_interval);

    let shutdown = CancellationToken::new();

    let dispatcher_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { dispatcher.run(shutdown).await })
    };
    let reconciler_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reconciler.run(shutdown).await })
    };

    tracing::info!("Worker ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping loops...");
    shutdown.cancel();

    let _ = tokio::join!(dispatcher_handle, reconciler_handle);
    tracing::info!("Worker stopped");
    Ok(())
}
