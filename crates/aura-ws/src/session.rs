use uuid::Uuid;

/// An authenticated socket connection. One user may hold several of these
/// at once (tabs, devices); each gets its own connection ID.
pub struct Session {
    pub connection_id: Uuid,
    pub user_id: i64,
}

impl Session {
    pub fn new(user_id: i64) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            user_id,
        }
    }
}
