use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, Message, Notification, UserId};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    #[serde(rename = "ready")]
    Ready { user_id: UserId, username: String },

    /// A message was persisted in a conversation room the client joined
    #[serde(rename = "receive_message")]
    ReceiveMessage(Message),

    /// A command from this connection failed
    #[serde(rename = "messageError")]
    MessageError(String),

    /// A notification was created for the user whose room the client joined
    #[serde(rename = "new_notification")]
    NewNotification(Notification),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    #[serde(rename = "identify")]
    Identify { token: String },

    /// Receive notifications addressed to this user
    #[serde(rename = "join_user_room")]
    JoinUserRoom(UserId),

    /// Receive messages posted to this conversation
    #[serde(rename = "join_conversation")]
    JoinConversation(ConversationId),

    #[serde(rename = "sendMessage")]
    SendMessage(SendMessagePayload),
}

/// Every field is optional on the wire; missing values are a validation
/// failure reported back through `messageError`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub sender_id: Option<UserId>,
    pub receiver_id: Option<UserId>,
    pub message_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_message_frame() {
        let raw =
            r#"{"type":"sendMessage","data":{"senderId":7,"receiverId":9,"messageText":"hi"}}"#;
        let cmd: GatewayCommand = serde_json::from_str(raw).unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::SendMessage(SendMessagePayload {
                sender_id: Some(7),
                receiver_id: Some(9),
                message_text: Some("hi".into()),
            })
        );
    }

    #[test]
    fn parses_join_frames() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"join_user_room","data":5}"#).unwrap();
        assert_eq!(cmd, GatewayCommand::JoinUserRoom(5));

        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"join_conversation","data":42}"#).unwrap();
        assert_eq!(cmd, GatewayCommand::JoinConversation(42));
    }

    #[test]
    fn missing_payload_fields_still_parse() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"sendMessage","data":{"receiverId":9}}"#).unwrap();
        match cmd {
            GatewayCommand::SendMessage(p) => {
                assert!(p.sender_id.is_none());
                assert!(p.message_text.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn error_event_uses_socket_event_name() {
        let json = serde_json::to_value(GatewayEvent::MessageError("nope".into())).unwrap();
        assert_eq!(json["type"], "messageError");
        assert_eq!(json["data"], "nope");
    }
}
