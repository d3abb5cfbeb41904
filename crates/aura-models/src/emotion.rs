use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detected emotion with its generated art, produced by the external
/// detection pipeline. This service only stores and resolves references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionView {
    pub id: i64,
    pub user_id: i64,
    pub label: String,
    pub confidence: f64,
    pub art_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
