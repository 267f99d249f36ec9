//! Error types for the chat server
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send error message to client).
#[derive(Debug, Error)]
pub enum AppError {
    /// Line framing error, e.g. an over-long line (fatal)
    #[error("Line codec error: {0}")]
    Lines(#[from] LinesCodecError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Client tried to talk without being in a room
    #[error("You must join a room first!")]
    NotInRoom,

    /// Command is missing a required argument
    #[error("usage: {0}")]
    MissingArgument(&'static str),
}

/// Message send errors
///
/// Occurs when delivering to a client's outbound queue fails.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client is not draining its queue fast enough
    #[error("Channel full")]
    ChannelFull,
}
