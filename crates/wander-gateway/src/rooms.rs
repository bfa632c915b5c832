use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use wander_types::events::GatewayEvent;
use wander_types::models::{ConnId, ConversationId, UserId};

/// A broadcast group that live connections join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// Notification delivery for one user
    User(UserId),
    /// Message delivery for one conversation
    Conversation(ConversationId),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user_{}", id),
            Self::Conversation(id) => write!(f, "convo_{}", id),
        }
    }
}

/// Tracks which live connections are in which rooms.
///
/// Process-local and not persisted. A connection is in at most one user room
/// and any number of conversation rooms; all of it is dropped on `unregister`.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnId, ConnectionEntry>,
    rooms: HashMap<Room, HashSet<ConnId>>,
}

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<GatewayEvent>,
    user_room: Option<UserId>,
    conversations: HashSet<ConversationId>,
}

impl RegistryState {
    fn leave(&mut self, conn_id: ConnId, room: Room) {
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(&conn_id);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection. Events for it arrive on the returned receiver.
    pub async fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.connections.insert(
            conn_id,
            ConnectionEntry {
                tx,
                user_room: None,
                conversations: HashSet::new(),
            },
        );
        (conn_id, rx)
    }

    /// Drop a connection and every room membership it held.
    pub async fn unregister(&self, conn_id: ConnId) {
        let mut state = self.inner.write().await;
        let Some(entry) = state.connections.remove(&conn_id) else {
            return;
        };

        if let Some(user_id) = entry.user_room {
            state.leave(conn_id, Room::User(user_id));
        }
        for conversation_id in entry.conversations {
            state.leave(conn_id, Room::Conversation(conversation_id));
        }
    }

    /// Add a connection to a room. Returns `false` if it was already a member
    /// or the connection is not registered. Joining a second user room moves
    /// the connection out of the first.
    pub async fn join(&self, conn_id: ConnId, room: Room) -> bool {
        let mut state = self.inner.write().await;
        let Some(entry) = state.connections.get_mut(&conn_id) else {
            warn!("Join of {} by unregistered connection {}", room, conn_id);
            return false;
        };

        let previous_user_room = match room {
            Room::User(user_id) => match entry.user_room.replace(user_id) {
                Some(prev) if prev == user_id => return false,
                prev => prev,
            },
            Room::Conversation(conversation_id) => {
                if !entry.conversations.insert(conversation_id) {
                    return false;
                }
                None
            }
        };

        if let Some(prev) = previous_user_room {
            state.leave(conn_id, Room::User(prev));
        }
        state.rooms.entry(room).or_default().insert(conn_id);
        true
    }

    /// Deliver an event to every connection in `room`. Returns how many
    /// connections it was handed to; an empty room is not an error.
    pub async fn emit(&self, room: Room, event: GatewayEvent) -> usize {
        let state = self.inner.read().await;
        let Some(members) = state.rooms.get(&room) else {
            return 0;
        };

        let mut delivered = 0;
        for conn_id in members {
            if let Some(entry) = state.connections.get(conn_id) {
                if entry.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        debug!("Emitted to {} ({} connections)", room, delivered);
        delivered
    }

    /// Send an event to a single connection.
    pub async fn send_to(&self, conn_id: ConnId, event: GatewayEvent) -> bool {
        let state = self.inner.read().await;
        state
            .connections
            .get(&conn_id)
            .is_some_and(|entry| entry.tx.send(event).is_ok())
    }

    pub async fn room_size(&self, room: Room) -> usize {
        self.inner.read().await.rooms.get(&room).map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Rooms a connection currently belongs to.
    pub async fn rooms_of(&self, conn_id: ConnId) -> Vec<Room> {
        let state = self.inner.read().await;
        let Some(entry) = state.connections.get(&conn_id) else {
            return vec![];
        };

        entry
            .user_room
            .map(Room::User)
            .into_iter()
            .chain(entry.conversations.iter().copied().map(Room::Conversation))
            .collect()
    }
}
