//! Line protocol definitions
//!
//! Inbound lines are split on whitespace and the first token selects a
//! `CommandKind`. Outbound messages are `ServerMessage` values rendered as
//! a single text line through `Display`.

use std::fmt;

use crate::error::AppError;

/// Client → Server command kind
///
/// Selected by the first token of an input line. Matching is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `/nick <name>`
    SetNick,
    /// `/join <room>`
    Join,
    /// `/rooms`
    ListRooms,
    /// `/msg <text...>` or any un-prefixed text
    SendMessage,
    /// `/quit`, also synthesized when the connection goes away
    Quit,
}

impl CommandKind {
    /// Command word used when a command is synthesized or normalized
    pub fn word(self) -> &'static str {
        match self {
            CommandKind::SetNick => "/nick",
            CommandKind::Join => "/join",
            CommandKind::ListRooms => "/rooms",
            CommandKind::SendMessage => "/msg",
            CommandKind::Quit => "/quit",
        }
    }

    /// Minimum number of tokens, command word included
    pub fn min_args(self) -> usize {
        match self {
            CommandKind::SetNick | CommandKind::Join | CommandKind::SendMessage => 2,
            CommandKind::ListRooms | CommandKind::Quit => 1,
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            CommandKind::SetNick => "/nick <name>",
            CommandKind::Join => "/join <room>",
            CommandKind::ListRooms => "/rooms",
            CommandKind::SendMessage => "/msg <text...>",
            CommandKind::Quit => "/quit",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "/nick" => Some(CommandKind::SetNick),
            "/join" => Some(CommandKind::Join),
            "/rooms" => Some(CommandKind::ListRooms),
            "/msg" => Some(CommandKind::SendMessage),
            "/quit" => Some(CommandKind::Quit),
            _ => None,
        }
    }
}

/// Parse one input line into a command kind and its tokens
///
/// Returns `None` for blank lines. Text without a known command word is a
/// message; its tokens are prefixed with `/msg` so the text always starts
/// at index 1.
pub fn parse_line(line: &str) -> Option<(CommandKind, Vec<String>)> {
    let mut args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    let first = args.first()?;

    match CommandKind::from_word(first) {
        Some(kind) => Some((kind, args)),
        None => {
            args.insert(0, CommandKind::SendMessage.word().to_string());
            Some((CommandKind::SendMessage, args))
        }
    }
}

/// Server → Client message
///
/// Every private reply and every broadcast is one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Nickname changed
    NickSet { nick: String },
    /// Private welcome after joining
    Welcome { room: String },
    /// Another member joined the room
    Joined { nick: String },
    /// A member left the room
    Left { nick: String },
    /// Answer to `/rooms`
    RoomList { names: Vec<String> },
    /// Chat line broadcast to the room
    Chat { from: String, text: String },
    /// Sent before the connection is closed on quit
    Farewell,
    /// Sent to everyone when the server stops
    ShuttingDown,
    /// Error occurred
    Error { message: String },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::NickSet { nick } => write!(f, "New Nickname: {}", nick),
            ServerMessage::Welcome { room } => write!(f, "Welcome to {}!", room),
            ServerMessage::Joined { nick } => write!(f, "{} has joined the room.", nick),
            ServerMessage::Left { nick } => write!(f, "{} has left the room", nick),
            ServerMessage::RoomList { names } => {
                write!(f, "Available Rooms: {}", names.join(", "))
            }
            ServerMessage::Chat { from, text } => write!(f, "{}: {}", from, text),
            ServerMessage::Farewell => f.write_str("Bye Bye!"),
            ServerMessage::ShuttingDown => f.write_str("Server is shutting down."),
            ServerMessage::Error { message } => write!(f, "err: {}", message),
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let message = match &err {
            AppError::NotInRoom | AppError::MissingArgument(_) => err.to_string(),
            // Fatal errors are not typically converted (connection closes)
            _ => "Internal error".to_string(),
        };
        ServerMessage::Error { message }
    }
}
