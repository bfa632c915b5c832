use tracing::info;

use wander_types::events::GatewayCommand;
use wander_types::models::{ConnId, UserId};

use crate::error::ChatError;
use crate::hub::ChatHub;
use crate::rooms::Room;

/// The authenticated identity behind one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: ConnId,
    pub user_id: UserId,
    pub username: String,
}

/// Dispatch one client command. Errors are for the originating connection
/// only; the caller turns them into a `messageError`.
pub async fn handle_command(
    hub: &ChatHub,
    session: &Session,
    cmd: GatewayCommand,
) -> Result<(), ChatError> {
    match cmd {
        GatewayCommand::Identify { .. } => Ok(()), // Already handled

        GatewayCommand::JoinUserRoom(user_id) => {
            if user_id != session.user_id {
                return Err(ChatError::AccessDenied);
            }
            if hub.rooms.join(session.conn_id, Room::User(user_id)).await {
                info!("{} ({}) joined {}", session.username, session.user_id, Room::User(user_id));
            }
            Ok(())
        }

        GatewayCommand::JoinConversation(conversation_id) => {
            hub.relay
                .ensure_participant(conversation_id, session.user_id)
                .await?;
            let room = Room::Conversation(conversation_id);
            if hub.rooms.join(session.conn_id, room).await {
                info!("{} ({}) joined {}", session.username, session.user_id, room);
            }
            Ok(())
        }

        GatewayCommand::SendMessage(payload) => {
            if payload.sender_id.is_some_and(|id| id != session.user_id) {
                return Err(ChatError::AccessDenied);
            }
            hub.relay.send(payload).await?;
            Ok(())
        }
    }
}
