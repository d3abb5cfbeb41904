use crate::dispatch::MessageDispatcher;
use crate::events::EventBus;
use crate::notify::Notifier;
use crate::presence::PresenceCoordinator;
use crate::profiles::ProfileCache;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomMembership;
use crate::typing::TypingTracker;
use aura_db::DbPool;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub registration_enabled: bool,
    /// Snowflake worker ID for this server instance.
    pub worker_id: u16,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub event_bus: EventBus,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomMembership>,
    pub typing: Arc<TypingTracker>,
    pub presence: Arc<PresenceCoordinator>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub notifier: Notifier,
    pub profiles: ProfileCache,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let event_bus = EventBus::default();
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomMembership::new());
        let typing = Arc::new(TypingTracker::new());
        let profiles = ProfileCache::new();
        let notifier = Notifier::spawn(db.clone(), config.worker_id);
        let presence = Arc::new(PresenceCoordinator::new(
            db.clone(),
            registry.clone(),
            rooms.clone(),
            typing.clone(),
            event_bus.clone(),
            profiles.clone(),
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            db.clone(),
            registry.clone(),
            event_bus.clone(),
            notifier.clone(),
            profiles.clone(),
            config.worker_id,
        ));
        Self {
            db,
            config,
            event_bus,
            registry,
            rooms,
            typing,
            presence,
            dispatcher,
            notifier,
            profiles,
            shutdown: Arc::new(Notify::new()),
        }
    }
}
