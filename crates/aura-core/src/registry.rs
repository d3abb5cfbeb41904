use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Outcome of removing a connection from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unregistered {
    pub user_id: i64,
    /// True when this was the user's last open connection.
    pub last_connection: bool,
}

/// Tracks which users have live socket connections. A user is online iff
/// they own at least one registered connection; multiple tabs/devices each
/// get their own connection ID under the same user.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<i64, HashSet<ConnectionId>>,
    owners: DashMap<ConnectionId, i64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this is the user's first live connection (the
    /// user just transitioned to online).
    pub fn register(&self, user_id: i64, connection_id: ConnectionId) -> bool {
        self.owners.insert(connection_id, user_id);
        let mut entry = self.connections.entry(user_id).or_default();
        let was_empty = entry.is_empty();
        entry.insert(connection_id);
        was_empty
    }

    pub fn unregister(&self, connection_id: ConnectionId) -> Option<Unregistered> {
        let (_, user_id) = self.owners.remove(&connection_id)?;
        let mut last_connection = false;
        self.connections.remove_if_mut(&user_id, |_, conns| {
            conns.remove(&connection_id);
            last_connection = conns.is_empty();
            last_connection
        });
        Some(Unregistered {
            user_id,
            last_connection,
        })
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.connections
            .get(&user_id)
            .map(|c| !c.is_empty())
            .unwrap_or(false)
    }

    pub fn connections_for(&self, user_id: i64) -> Vec<ConnectionId> {
        self.connections
            .get(&user_id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn user_of(&self, connection_id: ConnectionId) -> Option<i64> {
        self.owners.get(&connection_id).map(|u| *u)
    }
}
