//! Multi-room line chat server - Entry Point
//!
//! Parses flags, sets up logging and runs the accept loop until Ctrl-C.

use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_chat::config::{
    DEFAULT_ADDR, DEFAULT_COMMAND_BUFFER, DEFAULT_MAX_LINE_LENGTH, DEFAULT_OUTBOUND_BUFFER,
    DEFAULT_WRITE_TIMEOUT_SECS,
};
use room_chat::{serve, ServerConfig};

/// Multi-room line chat server
#[derive(Parser, Debug)]
#[command(name = "room_chat")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = DEFAULT_ADDR)]
    bind: String,

    /// Capacity of the command channel into the dispatcher
    #[arg(long, default_value_t = DEFAULT_COMMAND_BUFFER)]
    command_buffer: usize,

    /// Capacity of each client's outbound queue
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    outbound_buffer: usize,

    /// Longest accepted input line in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,

    /// Seconds a closing connection may spend flushing before it is dropped
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT_SECS)]
    write_timeout_secs: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "room_chat=info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging with environment filter
    // RUST_LOG overrides --log-level, e.g. RUST_LOG=room_chat=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = ServerConfig {
        bind_addr: args.bind,
        command_buffer: args.command_buffer,
        outbound_buffer: args.outbound_buffer,
        max_line_length: args.max_line_length,
        write_timeout: Duration::from_secs(args.write_timeout_secs),
    };

    // Start TCP listener
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Chat server listening on {}", listener.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep serving; dropping the sender would stop the server
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl-C - shutting down");
        let _ = shutdown_tx.send(true);
    });

    serve(listener, config, shutdown_rx).await;

    info!("Chat server stopped");
    Ok(())
}
