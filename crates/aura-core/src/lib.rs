pub mod auth;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod notify;
pub mod presence;
pub mod profiles;
pub mod registry;
pub mod rooms;
pub mod state;
pub mod typing;

pub use error::CoreError;
pub use state::{AppConfig, AppState};
