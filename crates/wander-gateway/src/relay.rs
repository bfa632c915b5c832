use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use wander_db::{Database, SendOutcome};
use wander_types::events::{GatewayEvent, SendMessagePayload};
use wander_types::models::{Conversation, ConversationId, ConversationSummary, Message, UserId};

use crate::directory::{normalize, retry_transient};
use crate::error::ChatError;
use crate::notifier::NotificationDispatcher;
use crate::rooms::{Room, RoomRegistry};
use crate::run_blocking;

/// Upper bound for a single page of history.
pub const MAX_PAGE: u32 = 200;

/// Persists messages and fans them out to the conversation's room.
#[derive(Clone)]
pub struct MessageRelay {
    db: Arc<Database>,
    rooms: RoomRegistry,
    /// Receives a "new message" notification per send when set.
    notifier: Option<NotificationDispatcher>,
    /// Held from commit through broadcast so broadcast order is commit order.
    commit_order: Arc<Mutex<()>>,
}

impl MessageRelay {
    pub fn new(
        db: Arc<Database>,
        rooms: RoomRegistry,
        notifier: Option<NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            rooms,
            notifier,
            commit_order: Arc::new(Mutex::new(())),
        }
    }

    /// Validate, persist (conversation + message in one transaction), then
    /// broadcast `receive_message` to everyone in the conversation room.
    pub async fn send(&self, payload: SendMessagePayload) -> Result<Message, ChatError> {
        let sender_id = payload
            .sender_id
            .ok_or_else(|| ChatError::validation("senderId is required"))?;
        let receiver_id = payload
            .receiver_id
            .ok_or_else(|| ChatError::validation("receiverId is required"))?;
        let content = payload
            .message_text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ChatError::validation("messageText is required"))?;
        let pair = normalize(sender_id, receiver_id)?;

        let message = {
            let _order = self.commit_order.lock().await;

            let db = self.db.clone();
            let outcome =
                retry_transient(pair, move || db.send_message(sender_id, pair, &content)).await?;

            let (row, conversation_created) = match outcome {
                SendOutcome::Sent {
                    message,
                    conversation_created,
                } => (message, conversation_created),
                SendOutcome::UnknownUser(user_id) => {
                    return Err(ChatError::NotFound(format!("user {}", user_id)));
                }
            };
            let message = Message::from(row);

            if conversation_created {
                info!(
                    "Created conversation {} for ({}, {})",
                    message.conversation_id,
                    pair.low(),
                    pair.high()
                );
            }

            let delivered = self
                .rooms
                .emit(
                    Room::Conversation(message.conversation_id),
                    GatewayEvent::ReceiveMessage(message.clone()),
                )
                .await;
            debug!(
                "Message {} from {} relayed to {} connections",
                message.id, sender_id, delivered
            );

            message
        };

        if let Some(notifier) = &self.notifier {
            self.notify_receiver(notifier, &message, receiver_id).await;
        }

        Ok(message)
    }

    async fn notify_receiver(
        &self,
        notifier: &NotificationDispatcher,
        message: &Message,
        receiver_id: UserId,
    ) {
        let db = self.db.clone();
        let sender_id = message.sender_id;
        let sender_name = match run_blocking(move || db.get_user(sender_id)).await {
            Ok(Some(user)) => user.username,
            Ok(None) => "someone".to_string(),
            Err(e) => {
                warn!("Sender lookup for message {} failed: {:?}", message.id, e);
                return;
            }
        };

        let text = format!("New message from {}", sender_name);
        let link = format!("/chat/{}", message.conversation_id);
        if let Err(e) = notifier.create_notification(receiver_id, &text, Some(&link)).await {
            warn!("Message notification for user {} failed: {:?}", receiver_id, e);
        }
    }

    /// The conversation, if `user_id` is one of its two participants.
    pub async fn ensure_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Conversation, ChatError> {
        let db = self.db.clone();
        let conversation = run_blocking(move || db.get_conversation(conversation_id))
            .await?
            .map(Conversation::from)
            .ok_or_else(|| ChatError::NotFound(format!("conversation {}", conversation_id)))?;

        if !conversation.has_participant(user_id) {
            return Err(ChatError::AccessDenied);
        }
        Ok(conversation)
    }

    /// History of a conversation, ascending by `sent_at`. Only participants may read it.
    pub async fn list_messages(
        &self,
        conversation_id: ConversationId,
        caller_id: UserId,
        before: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ChatError> {
        self.ensure_participant(conversation_id, caller_id).await?;

        let db = self.db.clone();
        let limit = limit.map(|l| l.min(MAX_PAGE));
        let rows = run_blocking(move || db.get_messages(conversation_id, before, limit)).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Conversations of `user_id`, most recently active first.
    pub async fn list_conversations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        let db = self.db.clone();
        let rows = run_blocking(move || db.list_conversations(user_id)).await?;
        Ok(rows.into_iter().map(ConversationSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db() -> Arc<Database> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for (id, name) in [(1, "ana"), (2, "ben"), (3, "cleo"), (7, "gus"), (9, "ida")] {
            db.create_user(id, name).unwrap();
        }
        db
    }

    fn relay() -> (MessageRelay, RoomRegistry, Arc<Database>) {
        let db = seeded_db();
        let rooms = RoomRegistry::new();
        (MessageRelay::new(db.clone(), rooms.clone(), None), rooms, db)
    }

    fn payload(sender: i64, receiver: i64, text: &str) -> SendMessagePayload {
        SendMessagePayload {
            sender_id: Some(sender),
            receiver_id: Some(receiver),
            message_text: Some(text.to_string()),
        }
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn first_message_creates_conversation_and_broadcasts() {
        let (relay, rooms, db) = relay();
        let (listener, mut rx) = rooms.register().await;
        // Ids start at 1, so the new conversation's room is known in advance.
        rooms.join(listener, Room::Conversation(1)).await;

        let message = relay.send(payload(7, 9, "hi")).await.unwrap();
        assert_eq!(message.conversation_id, 1);
        assert_eq!(count(&db, "conversations"), 1);
        assert_eq!(count(&db, "messages"), 1);

        match rx.try_recv().unwrap() {
            GatewayEvent::ReceiveMessage(received) => {
                assert_eq!(received.sender_id, 7);
                assert_eq!(received.content, "hi");
                assert_eq!(received, message);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_without_writes() {
        let (relay, _rooms, db) = relay();

        let cases = [
            SendMessagePayload {
                sender_id: None,
                ..payload(1, 2, "x")
            },
            SendMessagePayload {
                receiver_id: None,
                ..payload(1, 2, "x")
            },
            SendMessagePayload {
                message_text: None,
                ..payload(1, 2, "x")
            },
            payload(1, 2, "   "),
            payload(1, 1, "talking to myself"),
        ];

        for case in cases {
            assert!(matches!(relay.send(case).await, Err(ChatError::Validation(_))));
        }
        assert_eq!(count(&db, "conversations"), 0);
        assert_eq!(count(&db, "messages"), 0);
    }

    #[tokio::test]
    async fn unknown_receiver_is_not_found() {
        let (relay, _rooms, db) = relay();
        assert!(matches!(
            relay.send(payload(1, 500, "hello?")).await,
            Err(ChatError::NotFound(_))
        ));
        assert_eq!(count(&db, "conversations"), 0);
    }

    #[tokio::test]
    async fn history_is_ordered_and_complete() {
        let (relay, _rooms, _db) = relay();
        let mut sent = Vec::new();
        for (from, to, text) in [(1, 2, "a"), (2, 1, "b"), (1, 2, "c"), (2, 1, "d")] {
            sent.push(relay.send(payload(from, to, text)).await.unwrap());
        }
        // Different conversation, must not show up.
        relay.send(payload(1, 3, "elsewhere")).await.unwrap();

        let history = relay.list_messages(sent[0].conversation_id, 2, None, None).await.unwrap();
        assert_eq!(history, sent);
        assert!(history.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
    }

    #[tokio::test]
    async fn history_is_paged_with_cursor() {
        let (relay, _rooms, _db) = relay();
        let mut sent = Vec::new();
        for text in ["1", "2", "3", "4", "5"] {
            sent.push(relay.send(payload(1, 2, text)).await.unwrap());
        }
        let cid = sent[0].conversation_id;

        let latest = relay.list_messages(cid, 1, None, Some(2)).await.unwrap();
        assert_eq!(latest, sent[3..].to_vec());

        let older = relay.list_messages(cid, 1, Some(sent[3].id), Some(2)).await.unwrap();
        assert_eq!(older, sent[1..3].to_vec());
    }

    #[tokio::test]
    async fn outsiders_cannot_read_history() {
        let (relay, _rooms, _db) = relay();
        let message = relay.send(payload(1, 2, "private")).await.unwrap();

        assert!(matches!(
            relay.list_messages(message.conversation_id, 3, None, None).await,
            Err(ChatError::AccessDenied)
        ));
        assert!(matches!(
            relay.list_messages(42, 1, None, None).await,
            Err(ChatError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn simultaneous_first_messages_share_one_conversation() {
        let (relay, _rooms, db) = relay();

        let a = tokio::spawn({
            let relay = relay.clone();
            async move { relay.send(payload(1, 2, "from one")).await }
        });
        let b = tokio::spawn({
            let relay = relay.clone();
            async move { relay.send(payload(2, 1, "from two")).await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a.conversation_id, b.conversation_id);
        assert_eq!(count(&db, "conversations"), 1);
        assert_eq!(count(&db, "messages"), 2);
    }

    #[tokio::test]
    async fn broadcast_follows_commit_order() {
        let (relay, rooms, _db) = relay();
        let (listener, mut rx) = rooms.register().await;
        rooms.join(listener, Room::Conversation(1)).await;

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let relay = relay.clone();
                tokio::spawn(async move { relay.send(payload(1, 2, &i.to_string())).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut received = Vec::new();
        while let Ok(GatewayEvent::ReceiveMessage(m)) = rx.try_recv() {
            received.push(m.id);
        }
        let history: Vec<_> = relay
            .list_messages(1, 1, None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(received, history);
    }

    #[tokio::test]
    async fn receiver_gets_notified_when_enabled() {
        let db = seeded_db();
        let rooms = RoomRegistry::new();
        let notifier = NotificationDispatcher::new(db.clone(), rooms.clone());
        let relay = MessageRelay::new(db.clone(), rooms.clone(), Some(notifier.clone()));

        let (conn, mut rx) = rooms.register().await;
        rooms.join(conn, Room::User(9)).await;

        let message = relay.send(payload(7, 9, "hi")).await.unwrap();

        match rx.try_recv().unwrap() {
            GatewayEvent::NewNotification(n) => {
                assert_eq!(n.user_id, 9);
                assert_eq!(n.message_text, "New message from gus");
                assert_eq!(n.link_url, Some(format!("/chat/{}", message.conversation_id)));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(notifier.list_notifications(7).await.unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn conversation_list_for_caller() {
        let (relay, _rooms, _db) = relay();
        relay.send(payload(1, 2, "old")).await.unwrap();
        relay.send(payload(3, 1, "newer")).await.unwrap();

        let list = relay.list_conversations(1).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].partner.username, "cleo");
        assert_eq!(list[0].last_message.as_ref().map(|m| m.content.as_str()), Some("newer"));
        assert_eq!(list[1].partner.id, 2);
    }
}
