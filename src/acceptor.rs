//! TCP accept loop
//!
//! Starts the ChatServer actor and spawns a connection handler for every
//! accepted socket until shutdown is signalled.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::server::ChatServer;
use crate::types::ClientId;

/// Serve connections from `listener` until `shutdown` turns true
///
/// Returns after the ChatServer has stopped and released every client.
pub async fn serve(listener: TcpListener, config: ServerConfig, mut shutdown: watch::Receiver<bool>) {
    let config = Arc::new(config);

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    let server = tokio::spawn(ChatServer::new(cmd_rx, shutdown.clone()).run());
    info!("ChatServer actor started");

    // Connection accept loop
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();
                    let shutdown = shutdown.clone();
                    let config = Arc::clone(&config);

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        let client_id = ClientId::from(addr);
                        if let Err(e) = handle_connection(stream, client_id, cmd_tx, shutdown, &config).await {
                            error!("Connection handler error for {}: {}", client_id, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Accept loop stopping");
                    break;
                }
            }
        }
    }

    drop(cmd_tx);
    if let Err(e) = server.await {
        error!("ChatServer task failed: {}", e);
    }
}
