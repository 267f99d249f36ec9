//! Client struct definition
//!
//! Represents a connected client with their state and outbound channel.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{ClientId, RoomName};

/// Nickname every client starts with
pub const DEFAULT_NICKNAME: &str = "anonymous";

/// Connected client information
///
/// Owned by the `ChatServer`. Dropping it drops the sender, which ends the
/// connection's writer task and closes the transport.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Current nickname
    pub nickname: String,
    /// Room the client is currently in, by name
    pub room: Option<RoomName>,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            nickname: DEFAULT_NICKNAME.to_string(),
            room: None,
            sender,
        }
    }

    /// Queue a message for this client without waiting
    ///
    /// The dispatcher must never block on one slow client, so a full
    /// queue is reported as an error instead of awaited.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Set the client's nickname
    pub fn set_nickname(&mut self, nickname: String) {
        self.nickname = nickname;
    }
}
