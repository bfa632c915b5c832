use std::sync::Arc;

use wander_db::Database;

use crate::directory::ConversationDirectory;
use crate::notifier::NotificationDispatcher;
use crate::relay::MessageRelay;
use crate::rooms::RoomRegistry;

#[derive(Debug, Clone, Copy)]
pub struct HubOptions {
    /// Create a notification for the receiver of every sent message.
    pub notify_on_message: bool,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            notify_on_message: true,
        }
    }
}

/// Everything the REST handlers and WebSocket connections share. Created once
/// at startup; cloning is cheap.
#[derive(Clone)]
pub struct ChatHub {
    pub db: Arc<Database>,
    pub rooms: RoomRegistry,
    pub directory: ConversationDirectory,
    pub relay: MessageRelay,
    pub notifier: NotificationDispatcher,
}

impl ChatHub {
    pub fn new(db: Arc<Database>, options: HubOptions) -> Self {
        let rooms = RoomRegistry::new();
        let notifier = NotificationDispatcher::new(db.clone(), rooms.clone());
        let relay = MessageRelay::new(
            db.clone(),
            rooms.clone(),
            options.notify_on_message.then(|| notifier.clone()),
        );

        Self {
            directory: ConversationDirectory::new(db.clone()),
            db,
            rooms,
            relay,
            notifier,
        }
    }
}
