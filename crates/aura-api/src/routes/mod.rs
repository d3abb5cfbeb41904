pub mod auth;
pub mod chats;
pub mod notifications;
pub mod users;
