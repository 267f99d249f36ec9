//! ChatServer Actor implementation
//!
//! The central actor that owns all state: clients, rooms and membership.
//! Connection handlers talk to it only through the command channel, and it
//! applies commands one at a time in arrival order.

use std::collections::HashMap;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::AppError;
use crate::message::{CommandKind, ServerMessage};
use crate::room::RoomRegistry;
use crate::types::{ClientId, RoomName};

/// A parsed client command
///
/// `args` holds the whitespace-split input line with the command word at
/// index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub client_id: ClientId,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(kind: CommandKind, client_id: ClientId, args: Vec<String>) -> Self {
        Self {
            kind,
            client_id,
            args,
        }
    }

    /// Quit issued on behalf of a client whose connection went away
    pub fn quit(client_id: ClientId) -> Self {
        Self::new(
            CommandKind::Quit,
            client_id,
            vec![CommandKind::Quit.word().to_string()],
        )
    }
}

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Command read from a client's connection
    Client(Command),
}

/// The main ChatServer actor
///
/// Nothing else reads or writes the client table or the room registry,
/// so neither needs a lock.
pub struct ChatServer {
    /// All connected clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// All rooms ever joined
    rooms: RoomRegistry,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
    /// Set to true to stop the event loop
    shutdown: watch::Receiver<bool>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver and shutdown signal
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            clients: HashMap::new(),
            rooms: RoomRegistry::new(),
            receiver,
            shutdown,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Processes commands until every sender is dropped or shutdown is
    /// signalled. A dropped shutdown sender counts as a shutdown.
    pub async fn run(mut self) {
        info!("ChatServer started");

        if !*self.shutdown.borrow() {
            loop {
                tokio::select! {
                    // Shutdown wins over commands already queued, including
                    // the quits readers send while stopping
                    biased;
                    changed = self.shutdown.changed() => {
                        if changed.is_err() || *self.shutdown.borrow() {
                            break;
                        }
                    }
                    cmd = self.receiver.recv() => match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => break,
                    },
                }
            }
        }

        self.disconnect_all();
        info!("ChatServer shutting down");
    }

    /// Process a single command
    pub fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { client_id, sender } => {
                self.handle_connect(client_id, sender);
            }
            ServerCommand::Client(cmd) => self.dispatch(cmd),
        }
    }

    /// Room registry, for inspection
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Look up a connected client
    pub fn client(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn dispatch(&mut self, cmd: Command) {
        let Command {
            kind,
            client_id,
            args,
        } = cmd;

        if !self.clients.contains_key(&client_id) {
            debug!("Ignoring {:?} from unknown client {}", kind, client_id);
            return;
        }

        if args.len() < kind.min_args() {
            self.reply(client_id, AppError::MissingArgument(kind.usage()).into());
            return;
        }

        match kind {
            CommandKind::SetNick => self.handle_set_nick(client_id, args),
            CommandKind::Join => self.handle_join(client_id, args),
            CommandKind::ListRooms => self.handle_list_rooms(client_id),
            CommandKind::SendMessage => self.handle_send_message(client_id, args),
            CommandKind::Quit => self.handle_quit(client_id),
        }
    }

    /// Handle new client connection
    fn handle_connect(&mut self, client_id: ClientId, sender: mpsc::Sender<ServerMessage>) {
        info!("New client has connected: {}", client_id);
        let client = Client::new(client_id, sender);
        if self.clients.insert(client_id, client).is_some() {
            warn!("Client {} was already registered, replaced", client_id);
        }
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Handle nickname setting
    fn handle_set_nick(&mut self, client_id: ClientId, args: Vec<String>) {
        let Some(nick) = args.into_iter().nth(1) else {
            return;
        };
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };

        info!("Client {} set nickname to '{}'", client_id, nick);
        client.set_nickname(nick.clone());
        self.reply(client_id, ServerMessage::NickSet { nick });
    }

    /// Handle room joining, creating the room on first use
    fn handle_join(&mut self, client_id: ClientId, args: Vec<String>) {
        let Some(room_name) = args.get(1).map(|name| RoomName::from(name.as_str())) else {
            return;
        };
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };

        if client.room.as_ref() == Some(&room_name) {
            self.reply(client_id, ServerMessage::Welcome { room: room_name.0 });
            return;
        }

        let nick = client.nickname.clone();
        self.leave_current_room(client_id);

        let room = self.rooms.get_or_create(&room_name);
        room.add_member(client_id);
        room.broadcast_except(&self.clients, client_id, &ServerMessage::Joined { nick });

        if let Some(client) = self.clients.get_mut(&client_id) {
            client.room = Some(room_name.clone());
        }

        info!("Client {} joined room {}", client_id, room_name);
        self.reply(client_id, ServerMessage::Welcome { room: room_name.0 });
    }

    /// Handle room listing
    fn handle_list_rooms(&mut self, client_id: ClientId) {
        let names = self.rooms.names();
        self.reply(client_id, ServerMessage::RoomList { names });
    }

    /// Handle chat message
    fn handle_send_message(&mut self, client_id: ClientId, args: Vec<String>) {
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };

        // Check if in a room
        let Some(room_name) = client.room.clone() else {
            self.reply(client_id, AppError::NotInRoom.into());
            return;
        };

        let msg = ServerMessage::Chat {
            from: client.nickname.clone(),
            text: args[1..].join(" "),
        };

        let Some(room) = self.rooms.get(&room_name) else {
            warn!("Client {} points at missing room {}", client_id, room_name);
            return;
        };
        let delivered = room.broadcast(&self.clients, &msg);
        debug!(
            "Message from {} delivered to {}/{} members of {}",
            client_id,
            delivered,
            room.member_count(),
            room_name
        );
    }

    /// Handle quit, explicit or on connection loss
    fn handle_quit(&mut self, client_id: ClientId) {
        info!("Client has disconnected: {}", client_id);
        self.leave_current_room(client_id);

        // Dropping the client closes its outbound queue and then the transport
        if let Some(client) = self.clients.remove(&client_id) {
            if let Err(e) = client.send(ServerMessage::Farewell) {
                debug!("Farewell to {} not delivered: {}", client_id, e);
            }
        }

        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Helper: remove a client from its room and tell the remaining members
    fn leave_current_room(&mut self, client_id: ClientId) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        let Some(room_name) = client.room.take() else {
            return;
        };
        let nick = client.nickname.clone();

        let Some(room) = self.rooms.get_mut(&room_name) else {
            return;
        };
        room.remove_member(client_id);
        room.broadcast(&self.clients, &ServerMessage::Left { nick });
        info!("Client {} left room {}", client_id, room_name);
    }

    /// Helper: send a private message to one client
    fn reply(&self, client_id: ClientId, msg: ServerMessage) {
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };
        if let Err(e) = client.send(msg) {
            warn!("Reply to {} ({}) failed: {}", client.id, client.nickname, e);
        }
    }

    /// Helper: notify every client and drop them all
    fn disconnect_all(&mut self) {
        for (client_id, client) in self.clients.drain() {
            if let Err(e) = client.send(ServerMessage::ShuttingDown) {
                debug!("Shutdown notice to {} not delivered: {}", client_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse_line;

    fn id(port: u16) -> ClientId {
        ClientId(format!("127.0.0.1:{}", port).parse().unwrap())
    }

    fn new_server() -> (ChatServer, mpsc::Sender<ServerCommand>, watch::Sender<bool>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (ChatServer::new(cmd_rx, shutdown_rx), cmd_tx, shutdown_tx)
    }

    fn connect(server: &mut ChatServer, client_id: ClientId) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(32);
        server.handle_command(ServerCommand::Connect {
            client_id,
            sender: tx,
        });
        rx
    }

    fn send_line(server: &mut ChatServer, client_id: ClientId, line: &str) {
        let (kind, args) = parse_line(line).unwrap();
        server.handle_command(ServerCommand::Client(Command::new(kind, client_id, args)));
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            lines.push(msg.to_string());
        }
        lines
    }

    #[tokio::test]
    async fn test_set_nick() {
        let (mut server, _tx, _stop) = new_server();
        let mut rx = connect(&mut server, id(1));

        send_line(&mut server, id(1), "/nick alice");

        let client = server.client(id(1)).unwrap();
        assert_eq!(client.id, id(1));
        assert_eq!(client.nickname, "alice");
        assert_eq!(drain(&mut rx), vec!["New Nickname: alice"]);
    }

    #[tokio::test]
    async fn test_join_and_chat() {
        let (mut server, _tx, _stop) = new_server();
        let mut alice = connect(&mut server, id(1));
        let mut bob = connect(&mut server, id(2));

        send_line(&mut server, id(1), "/nick alice");
        send_line(&mut server, id(1), "/join lobby");
        assert_eq!(
            drain(&mut alice),
            vec!["New Nickname: alice", "Welcome to lobby!"]
        );

        send_line(&mut server, id(2), "/nick bob");
        send_line(&mut server, id(2), "/join lobby");
        assert_eq!(drain(&mut alice), vec!["bob has joined the room."]);
        assert_eq!(drain(&mut bob), vec!["New Nickname: bob", "Welcome to lobby!"]);

        send_line(&mut server, id(1), "hello");
        assert_eq!(drain(&mut alice), vec!["alice: hello"]);
        assert_eq!(drain(&mut bob), vec!["alice: hello"]);

        send_line(&mut server, id(2), "/msg hi   there");
        assert_eq!(drain(&mut alice), vec!["bob: hi there"]);
        assert_eq!(drain(&mut bob), vec!["bob: hi there"]);
    }

    #[tokio::test]
    async fn test_switch_rooms_moves_membership() {
        let (mut server, _tx, _stop) = new_server();
        let mut alice = connect(&mut server, id(1));
        let mut bob = connect(&mut server, id(2));
        send_line(&mut server, id(1), "/nick alice");
        send_line(&mut server, id(1), "/join lobby");
        send_line(&mut server, id(2), "/join lobby");
        drain(&mut alice);
        drain(&mut bob);

        send_line(&mut server, id(1), "/join attic");

        let lobby = server.rooms().get(&RoomName::from("lobby")).unwrap();
        let attic = server.rooms().get(&RoomName::from("attic")).unwrap();
        assert!(!lobby.contains(id(1)));
        assert!(attic.contains(id(1)));
        assert_eq!(
            server.client(id(1)).unwrap().room,
            Some(RoomName::from("attic"))
        );

        assert_eq!(drain(&mut bob), vec!["alice has left the room"]);
        assert_eq!(drain(&mut alice), vec!["Welcome to attic!"]);
    }

    #[tokio::test]
    async fn test_rejoin_same_room_keeps_membership() {
        let (mut server, _tx, _stop) = new_server();
        let mut alice = connect(&mut server, id(1));
        let mut bob = connect(&mut server, id(2));
        send_line(&mut server, id(1), "/join lobby");
        send_line(&mut server, id(2), "/join lobby");
        drain(&mut alice);
        drain(&mut bob);

        send_line(&mut server, id(1), "/join lobby");

        let lobby = server.rooms().get(&RoomName::from("lobby")).unwrap();
        assert!(lobby.contains(id(1)));
        assert_eq!(lobby.member_count(), 2);
        assert_eq!(drain(&mut alice), vec!["Welcome to lobby!"]);
        assert!(drain(&mut bob).is_empty());
    }

    #[tokio::test]
    async fn test_list_rooms() {
        let (mut server, _tx, _stop) = new_server();
        let mut rx = connect(&mut server, id(1));

        send_line(&mut server, id(1), "/rooms");
        assert_eq!(drain(&mut rx), vec!["Available Rooms: "]);

        send_line(&mut server, id(1), "/join lobby");
        send_line(&mut server, id(1), "/join attic");
        drain(&mut rx);

        send_line(&mut server, id(1), "/rooms");
        assert_eq!(drain(&mut rx), vec!["Available Rooms: attic, lobby"]);
    }

    #[tokio::test]
    async fn test_message_without_room() {
        let (mut server, _tx, _stop) = new_server();
        let mut rx = connect(&mut server, id(1));

        send_line(&mut server, id(1), "hello");

        assert!(server.rooms().is_empty());
        assert!(server.client(id(1)).unwrap().room.is_none());
        assert_eq!(drain(&mut rx), vec!["err: You must join a room first!"]);
    }

    #[tokio::test]
    async fn test_missing_arguments_fail_closed() {
        let (mut server, _tx, _stop) = new_server();
        let mut rx = connect(&mut server, id(1));

        send_line(&mut server, id(1), "/nick");
        send_line(&mut server, id(1), "/join");
        send_line(&mut server, id(1), "/msg");

        assert_eq!(
            drain(&mut rx),
            vec![
                "err: usage: /nick <name>",
                "err: usage: /join <room>",
                "err: usage: /msg <text...>",
            ]
        );
        assert_eq!(server.client(id(1)).unwrap().nickname, "anonymous");
        assert!(server.rooms().is_empty());
    }

    #[tokio::test]
    async fn test_quit_leaves_room_and_closes_queue() {
        let (mut server, _tx, _stop) = new_server();
        let mut alice = connect(&mut server, id(1));
        let mut bob = connect(&mut server, id(2));
        send_line(&mut server, id(1), "/nick alice");
        send_line(&mut server, id(1), "/join lobby");
        send_line(&mut server, id(2), "/join lobby");
        drain(&mut alice);
        drain(&mut bob);

        send_line(&mut server, id(1), "/quit");

        assert!(server.client(id(1)).is_none());
        let lobby = server.rooms().get(&RoomName::from("lobby")).unwrap();
        assert!(!lobby.contains(id(1)));
        assert_eq!(drain(&mut bob), vec!["alice has left the room"]);

        assert_eq!(alice.recv().await, Some(ServerMessage::Farewell));
        assert_eq!(alice.recv().await, None);
    }

    #[tokio::test]
    async fn test_commands_after_quit_are_ignored() {
        let (mut server, _tx, _stop) = new_server();
        let _rx = connect(&mut server, id(1));

        server.handle_command(ServerCommand::Client(Command::quit(id(1))));
        server.handle_command(ServerCommand::Client(Command::quit(id(1))));
        send_line(&mut server, id(1), "/join lobby");

        assert_eq!(server.client_count(), 0);
        assert!(server.rooms().is_empty());
    }

    #[tokio::test]
    async fn test_full_recipient_does_not_block_others() {
        let (mut server, _tx, _stop) = new_server();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        server.handle_command(ServerCommand::Connect {
            client_id: id(1),
            sender: slow_tx,
        });
        let mut bob = connect(&mut server, id(2));

        send_line(&mut server, id(1), "/join lobby");
        send_line(&mut server, id(2), "/join lobby");
        drain(&mut bob);

        for _ in 0..5 {
            send_line(&mut server, id(2), "ping");
        }

        assert_eq!(drain(&mut bob).len(), 5);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (mut server, cmd_tx, stop) = new_server();
        let mut rx = connect(&mut server, id(1));

        let task = tokio::spawn(server.run());
        cmd_tx
            .send(ServerCommand::Client(Command::new(
                CommandKind::ListRooms,
                id(1),
                vec!["/rooms".to_string()],
            )))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().to_string(), "Available Rooms: ");

        stop.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(rx.recv().await, Some(ServerMessage::ShuttingDown));
        assert_eq!(rx.recv().await, None);
    }
}
