use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::message::MessageView;
use crate::user::PublicUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
        }
    }
}

impl FromStr for ChatKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(ChatKind::Private),
            "group" => Ok(ChatKind::Group),
            _ => Err(()),
        }
    }
}

/// Chat as listed on the chat-list surface: participants expanded, last
/// message resolved, unread count computed for the requesting user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: i64,
    pub kind: ChatKind,
    pub name: Option<String>,
    pub admin_id: Option<i64>,
    pub participants: Vec<PublicUser>,
    pub last_message: Option<MessageView>,
    pub last_activity: DateTime<Utc>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}
