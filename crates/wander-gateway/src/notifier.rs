use std::sync::Arc;

use tracing::{debug, info};

use wander_db::Database;
use wander_types::api::NotificationList;
use wander_types::events::GatewayEvent;
use wander_types::models::{Notification, UserId};

use crate::error::ChatError;
use crate::rooms::{Room, RoomRegistry};
use crate::run_blocking;

/// Most recent notifications returned by a listing.
pub const RECENT_NOTIFICATIONS: u32 = 50;

/// Persists notifications and pushes them to the owner's user room.
///
/// The row is the durable guarantee. The push only reaches connections that
/// are in the room right now; nobody listening is not an error.
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Arc<Database>,
    rooms: RoomRegistry,
}

impl NotificationDispatcher {
    pub fn new(db: Arc<Database>, rooms: RoomRegistry) -> Self {
        Self { db, rooms }
    }

    pub async fn create_notification(
        &self,
        user_id: UserId,
        text: &str,
        link_url: Option<&str>,
    ) -> Result<Notification, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::validation("notification text is required"));
        }

        let db = self.db.clone();
        let text = text.to_string();
        let link_url = link_url.filter(|l| !l.trim().is_empty()).map(str::to_string);

        let row = run_blocking(move || db.insert_notification(user_id, &text, link_url.as_deref()))
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("user {}", user_id)))?;
        let notification = Notification::from(row);

        let delivered = self
            .rooms
            .emit(Room::User(user_id), GatewayEvent::NewNotification(notification.clone()))
            .await;
        debug!(
            "Notification {} for user {} pushed to {} connections",
            notification.id, user_id, delivered
        );

        Ok(notification)
    }

    /// The newest notifications (newest first) and the total unread count.
    pub async fn list_notifications(&self, user_id: UserId) -> Result<NotificationList, ChatError> {
        let db = self.db.clone();
        let (rows, unread_count) = run_blocking(move || {
            let rows = db.get_notifications(user_id, RECENT_NOTIFICATIONS)?;
            let unread = db.unread_notification_count(user_id)?;
            Ok((rows, unread))
        })
        .await?;

        Ok(NotificationList {
            notifications: rows.into_iter().map(Notification::from).collect(),
            unread_count,
        })
    }

    /// Mark every unread notification of `user_id` read. Returns how many
    /// changed; repeating the call changes nothing.
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<usize, ChatError> {
        let db = self.db.clone();
        let updated = run_blocking(move || db.mark_all_notifications_read(user_id)).await?;
        if updated > 0 {
            info!("Marked {} notifications read for user {}", updated, user_id);
        }
        Ok(updated)
    }
}
