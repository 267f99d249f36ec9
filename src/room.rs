//! Room and room registry
//!
//! Plain data structures owned by the `ChatServer`. Rooms are created on
//! first join and are kept even after the last member leaves.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::client::Client;
use crate::message::ServerMessage;
use crate::types::{ClientId, RoomName};

/// Named chat room
///
/// Tracks membership only; the clients themselves live in the server's
/// client table.
#[derive(Debug)]
pub struct Room {
    /// Room name for identification
    pub name: RoomName,
    /// Current members
    members: BTreeSet<ClientId>,
}

impl Room {
    /// Create an empty room
    pub fn new(name: RoomName) -> Self {
        Self {
            name,
            members: BTreeSet::new(),
        }
    }

    /// Add a member. Returns false if it was already present.
    pub fn add_member(&mut self, client_id: ClientId) -> bool {
        self.members.insert(client_id)
    }

    /// Remove a member. Returns false if it was not present.
    pub fn remove_member(&mut self, client_id: ClientId) -> bool {
        self.members.remove(&client_id)
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }

    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.iter().copied()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Deliver `msg` to every member
    ///
    /// Returns the number of successful deliveries.
    pub fn broadcast(&self, clients: &HashMap<ClientId, Client>, msg: &ServerMessage) -> usize {
        self.deliver(clients, msg, None)
    }

    /// Deliver `msg` to every member except `skip`
    pub fn broadcast_except(
        &self,
        clients: &HashMap<ClientId, Client>,
        skip: ClientId,
        msg: &ServerMessage,
    ) -> usize {
        self.deliver(clients, msg, Some(skip))
    }

    fn deliver(
        &self,
        clients: &HashMap<ClientId, Client>,
        msg: &ServerMessage,
        skip: Option<ClientId>,
    ) -> usize {
        let mut delivered = 0;
        for member_id in self.members() {
            if Some(member_id) == skip {
                continue;
            }
            let Some(member) = clients.get(&member_id) else {
                warn!("Room {} has unknown member {}", self.name, member_id);
                continue;
            };
            // A failing recipient must not stop delivery to the others
            match member.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast to {} in {} failed: {}", member.id, self.name, e),
            }
        }
        delivered
    }
}

/// All known rooms, keyed by name
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomName, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a room, creating it if this name has not been seen before
    pub fn get_or_create(&mut self, name: &RoomName) -> &mut Room {
        self.rooms
            .entry(name.clone())
            .or_insert_with(|| Room::new(name.clone()))
    }

    pub fn get(&self, name: &RoomName) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn get_mut(&mut self, name: &RoomName) -> Option<&mut Room> {
        self.rooms.get_mut(name)
    }

    /// Room names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.keys().map(|n| n.0.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn id(port: u16) -> ClientId {
        ClientId(format!("127.0.0.1:{}", port).parse().unwrap())
    }

    #[test]
    fn test_room_membership() {
        let mut room = Room::new(RoomName::from("lobby"));
        assert!(room.is_empty());

        assert!(room.add_member(id(1)));
        assert!(!room.add_member(id(1)));
        assert!(room.add_member(id(2)));
        assert_eq!(room.member_count(), 2);
        assert!(room.contains(id(1)));

        assert!(room.remove_member(id(1)));
        assert!(!room.remove_member(id(1)));
        assert!(!room.contains(id(1)));
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_registry_lazy_create() {
        let mut registry = RoomRegistry::new();
        assert!(registry.is_empty());

        let lobby = RoomName::from("lobby");
        registry.get_or_create(&lobby).add_member(id(1));
        registry.get_or_create(&lobby).add_member(id(2));
        registry.get_or_create(&RoomName::from("attic"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&lobby).unwrap().member_count(), 2);
        assert_eq!(registry.names(), vec!["attic", "lobby"]);
    }

    #[tokio::test]
    async fn test_broadcast_skips_failed_recipient() {
        let mut clients = HashMap::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, rx2) = mpsc::channel(4);
        let (tx3, mut rx3) = mpsc::channel(4);
        clients.insert(id(1), Client::new(id(1), tx1));
        clients.insert(id(2), Client::new(id(2), tx2));
        clients.insert(id(3), Client::new(id(3), tx3));
        drop(rx2);

        let mut room = Room::new(RoomName::from("lobby"));
        for port in 1..=3 {
            room.add_member(id(port));
        }

        let msg = ServerMessage::Chat {
            from: "alice".to_string(),
            text: "hi".to_string(),
        };
        assert_eq!(room.broadcast(&clients, &msg), 2);
        assert_eq!(rx1.try_recv().unwrap(), msg);
        assert_eq!(rx3.try_recv().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_broadcast_except() {
        let mut clients = HashMap::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        clients.insert(id(1), Client::new(id(1), tx1));
        clients.insert(id(2), Client::new(id(2), tx2));

        let mut room = Room::new(RoomName::from("lobby"));
        room.add_member(id(1));
        room.add_member(id(2));

        let msg = ServerMessage::Joined {
            nick: "bob".to_string(),
        };
        assert_eq!(room.broadcast_except(&clients, id(2), &msg), 1);
        assert_eq!(rx1.try_recv().unwrap(), msg);
        assert!(rx2.try_recv().is_err());
    }
}
