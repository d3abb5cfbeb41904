use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CursorParams {
    pub before: Option<i64>,
    pub limit: Option<u32>,
}

impl CursorParams {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(50).min(100)
    }
}

impl Default for CursorParams {
    fn default() -> Self {
        Self {
            before: None,
            limit: Some(50),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorResponse<T: Serialize> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// Offset pagination for list surfaces that page forward only.
#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> u32 {
        (self.page() - 1) * self.limit()
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: Some(1),
            limit: Some(20),
        }
    }
}
