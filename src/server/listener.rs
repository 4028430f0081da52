use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

use crate::client::Shared;
use crate::server::connection::Connection;

/// Accepts connections until a shutdown signal, then drains in-flight ones.
///
/// Each accepted connection becomes an independent task; nothing is shared
/// between them beyond the read-only `Shared` state. On shutdown the accept
/// loop stops immediately, in-flight connections get the configured grace
/// period to reach a terminal state, and whatever remains is aborted.
pub(crate) async fn run(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::debug!(%peer, "accepted connection");

                    let shared = shared.clone();
                    connections.spawn(async move {
                        shared.stats.connection_opened();
                        let conn = Connection::new(socket, peer, shared.clone());
                        if let Err(e) = conn.run().await {
                            tracing::error!(%peer, error = %e, "connection error");
                        }
                        shared.stats.connection_closed();
                    });
                }
                Err(error) => {
                    // Transient failures (fd exhaustion and the like) must
                    // not stop the accept loop
                    tracing::warn!(error = %error, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },

            _ = shutdown.changed() => {
                break;
            }
        }

        // Reap finished connection tasks as we go
        while connections.try_join_next().is_some() {}
    }

    drop(listener);

    if !connections.is_empty() {
        info!(in_flight = connections.len(), "draining in-flight connections");
        let drained = tokio::time::timeout(shared.config.shutdown_grace(), async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                "grace deadline reached, aborting remaining connections"
            );
            connections.shutdown().await;
        }
    }

    info!("listener stopped");
    Ok(())
}
