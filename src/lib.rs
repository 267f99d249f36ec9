//! Multi-room line chat server library
//!
//! Clients connect over TCP, pick a nickname, join named rooms and chat
//! with the other members of their room, one text line at a time.
//!
//! # Protocol
//! - `/nick <name>` - set nickname
//! - `/join <room>` - switch to a room, creating it if needed
//! - `/rooms` - list rooms
//! - `/msg <text...>` or plain text - talk to the current room
//! - `/quit` - leave
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning every room and client
//! - Each connection has a `handler` task that parses lines into commands
//! - No locks needed - all state access goes through the command channel
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::watch;
//! use room_chat::{serve, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     serve(listener, config, shutdown_rx).await;
//! }
//! ```

pub mod acceptor;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use acceptor::serve;
pub use client::Client;
pub use config::ServerConfig;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{parse_line, CommandKind, ServerMessage};
pub use room::{Room, RoomRegistry};
pub use server::{ChatServer, Command, ServerCommand};
pub use types::{ClientId, RoomName};
