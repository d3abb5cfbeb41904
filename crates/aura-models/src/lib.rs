pub mod chat;
pub mod emotion;
pub mod message;
pub mod notification;
pub mod socket;
pub mod user;
