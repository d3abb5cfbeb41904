use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::user::UserBrief;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Message,
    FriendRequest,
    FriendRequestAccepted,
    EmotionShared,
    EmotionReaction,
    System,
    Achievement,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Message => "message",
            NotificationType::FriendRequest => "friend_request",
            NotificationType::FriendRequestAccepted => "friend_request_accepted",
            NotificationType::EmotionShared => "emotion_shared",
            NotificationType::EmotionReaction => "emotion_reaction",
            NotificationType::System => "system",
            NotificationType::Achievement => "achievement",
        }
    }
}

impl FromStr for NotificationType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(NotificationType::Message),
            "friend_request" => Ok(NotificationType::FriendRequest),
            "friend_request_accepted" => Ok(NotificationType::FriendRequestAccepted),
            "emotion_shared" => Ok(NotificationType::EmotionShared),
            "emotion_reaction" => Ok(NotificationType::EmotionReaction),
            "system" => Ok(NotificationType::System),
            "achievement" => Ok(NotificationType::Achievement),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Medium => "medium",
            NotificationPriority::High => "high",
            NotificationPriority::Urgent => "urgent",
        }
    }
}

impl FromStr for NotificationPriority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(NotificationPriority::Low),
            "medium" => Ok(NotificationPriority::Medium),
            "high" => Ok(NotificationPriority::High),
            "urgent" => Ok(NotificationPriority::Urgent),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Social,
    System,
    Security,
    Feature,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Social => "social",
            NotificationCategory::System => "system",
            NotificationCategory::Security => "security",
            NotificationCategory::Feature => "feature",
        }
    }
}

impl FromStr for NotificationCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social" => Ok(NotificationCategory::Social),
            "system" => Ok(NotificationCategory::System),
            "security" => Ok(NotificationCategory::Security),
            "feature" => Ok(NotificationCategory::Feature),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: i64,
    pub notification_type: NotificationType,
    pub sender: Option<UserBrief>,
    pub title: String,
    pub body: String,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub emotion_id: Option<i64>,
    pub action_url: Option<String>,
    pub priority: NotificationPriority,
    pub category: NotificationCategory,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
