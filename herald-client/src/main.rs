//! Herald client entry point.
//!
//! Follows one user's notifications and logs the view whenever it changes.

use herald_client::realtime::spawn_ws_manager;
use herald_client::{ClientConfig, ClientError, ReconcilerSession, RestClient, ViewStatus, WsClient};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("herald_client=info,warn")),
        )
        .init();

    let config = ClientConfig::load()?;
    let rest = RestClient::new(&config)?;
    let ws = WsClient::new(&config);

    let (feed_tx, feed_rx) = mpsc::channel(256);
    let manager = spawn_ws_manager(ws, feed_tx);

    let (session, mut views) = ReconcilerSession::new(config.user_id, rest, config.request_timeout());
    let session = tokio::spawn(session.run(feed_rx));

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                match view.status() {
                    ViewStatus::Loading => tracing::info!("loading notifications"),
                    ViewStatus::Failed { reason } => {
                        tracing::warn!(reason = %reason, "notifications unavailable")
                    }
                    ViewStatus::Ready => {
                        tracing::info!(
                            total = view.items().len(),
                            unread = view.unread_count(),
                            latest = view.items().first().map(|n| n.title.as_str()).unwrap_or("-"),
                            "notifications"
                        );
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.abort();
    session.abort();
    Ok(())
}
