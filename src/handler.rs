//! Connection handler
//!
//! Handles one client connection: frames the byte stream into lines,
//! turns lines into commands for the ChatServer, and writes the client's
//! outbound messages back as lines.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::{parse_line, CommandKind, ServerMessage};
use crate::server::{Command, ServerCommand};
use crate::types::ClientId;

/// Handle an accepted connection until the client quits, the connection
/// fails, or the server shuts down
///
/// Registers the client, reads commands until the stream ends, and always
/// leaves through a Quit so the ChatServer drops the client. Returns once
/// the writer has flushed and closed its half of the transport, or after
/// `write_timeout` if the client stopped reading.
pub async fn handle_connection<S>(
    stream: S,
    client_id: ClientId,
    cmd_tx: mpsc::Sender<ServerCommand>,
    mut shutdown: watch::Receiver<bool>,
    config: &ServerConfig,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(config.max_line_length));
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    // Spawn write task (ServerMessage -> line)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if let Err(e) = sink.send(msg.to_string()).await {
                debug!("Write to {} failed: {}", client_id, e);
                break;
            }
        }
        // Ends once the ChatServer has dropped the client
        if let Err(e) = SinkExt::<String>::close(&mut sink).await {
            debug!("Closing connection to {} failed: {}", client_id, e);
        }
        debug!("Write task ended for {}", client_id);
    });

    let mut quit_sent = false;
    let mut result = Ok(());

    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    let Some((kind, args)) = parse_line(&line) else {
                        continue;
                    };
                    let is_quit = kind == CommandKind::Quit;
                    let cmd = ServerCommand::Client(Command::new(kind, client_id, args));
                    if cmd_tx.send(cmd).await.is_err() {
                        debug!("Server closed, ending read loop for {}", client_id);
                        break;
                    }
                    if is_quit {
                        quit_sent = true;
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Read error from {}: {}", client_id, e);
                    result = Err(e.into());
                    break;
                }
                None => {
                    debug!("Client {} closed the connection", client_id);
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Shutdown, ending read loop for {}", client_id);
                    break;
                }
            }
        }
    }

    // Implicit quit on connection loss
    if !quit_sent {
        let _ = cmd_tx
            .send(ServerCommand::Client(Command::quit(client_id)))
            .await;
    }
    drop(lines);

    // A client that stopped reading can block the writer forever
    match tokio::time::timeout(config.write_timeout, &mut write_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Write task for {} panicked: {}", client_id, e),
        Err(_) => {
            warn!("Write to {} timed out, dropping connection", client_id);
            write_task.abort();
            // Cancelled; awaiting makes sure the write half is dropped
            let _ = write_task.await;
        }
    }

    info!("Client {} disconnected", client_id);
    result
}
