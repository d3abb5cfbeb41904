use serde::{Deserialize, Serialize};

use crate::message::{MessageContent, MessageType};

// Client -> Server signals
pub const CLIENT_AUTHENTICATE: &str = "authenticate";
pub const CLIENT_JOIN_CHAT: &str = "join_chat";
pub const CLIENT_LEAVE_CHAT: &str = "leave_chat";
pub const CLIENT_SEND_MESSAGE: &str = "send_message";
pub const CLIENT_TYPING_START: &str = "typing_start";
pub const CLIENT_TYPING_STOP: &str = "typing_stop";
pub const CLIENT_ADD_REACTION: &str = "add_reaction";
pub const CLIENT_REMOVE_REACTION: &str = "remove_reaction";
pub const CLIENT_MARK_MESSAGES_READ: &str = "mark_messages_read";
pub const CLIENT_SEND_FRIEND_REQUEST: &str = "send_friend_request";
pub const CLIENT_SHARE_EMOTION: &str = "share_emotion";
pub const CLIENT_MARK_NOTIFICATION_READ: &str = "mark_notification_read";

// Server -> Client events
pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_USER_ONLINE: &str = "user_online";
pub const EVENT_USER_OFFLINE: &str = "user_offline";
pub const EVENT_JOINED_CHAT: &str = "joined_chat";
pub const EVENT_USER_JOINED_CHAT: &str = "user_joined_chat";
pub const EVENT_USER_LEFT_CHAT: &str = "user_left_chat";
pub const EVENT_NEW_MESSAGE: &str = "new_message";
pub const EVENT_USER_TYPING: &str = "user_typing";
pub const EVENT_MESSAGE_REACTION: &str = "message_reaction";
pub const EVENT_MESSAGES_READ: &str = "messages_read";
pub const EVENT_MESSAGE_EDITED: &str = "message_edited";
pub const EVENT_MESSAGE_DELETED: &str = "message_deleted";
pub const EVENT_FRIEND_REQUEST_RECEIVED: &str = "friend_request_received";
pub const EVENT_EMOTION_SHARED: &str = "emotion_shared";
pub const EVENT_NOTIFICATION_UPDATED: &str = "notification_updated";

/// Wire frame, both directions: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SocketFrame {
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthenticatePayload {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub chat_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub chat_id: i64,
    pub content: MessageContent,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub reply_to: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionPayload {
    pub message_id: i64,
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReactionPayload {
    pub message_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestPayload {
    pub target_user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEmotionPayload {
    pub emotion_id: i64,
    #[serde(default)]
    pub recipients: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationPayload {
    pub notification_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let frame = SocketFrame::new(
            CLIENT_SEND_MESSAGE,
            serde_json::json!({"chatId": 7, "content": {"text": "hey"}, "type": "text"}),
        );
        let wire = serde_json::to_string(&frame).unwrap();
        let parsed: SocketFrame = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed.event, CLIENT_SEND_MESSAGE);
        let payload: SendMessagePayload = serde_json::from_value(parsed.data).unwrap();
        assert_eq!(payload.chat_id, 7);
        assert_eq!(payload.content.text.as_deref(), Some("hey"));
        assert!(payload.reply_to.is_none());
    }

    #[test]
    fn frame_tolerates_missing_data() {
        let parsed: SocketFrame = serde_json::from_str(r#"{"event":"typing_stop"}"#).unwrap();
        assert_eq!(parsed.event, CLIENT_TYPING_STOP);
        assert!(parsed.data.is_null());
    }
}
