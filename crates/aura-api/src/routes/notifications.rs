use aura_core::AppState;
use aura_db::notifications::NotificationRow;
use aura_db::DbPool;
use aura_models::notification::NotificationView;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub unread_only: Option<bool>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = aura_util::pagination::PageParams {
        page: query.page,
        limit: query.limit,
    };
    let unread_only = query.unread_only.unwrap_or(false);
    let now = Utc::now();
    let rows = aura_db::notifications::list_notifications(
        &state.db,
        auth.user_id,
        unread_only,
        page.limit() as i64,
        page.offset() as i64,
        now,
    )
    .await?;
    let total =
        aura_db::notifications::count_notifications(&state.db, auth.user_id, unread_only, now)
            .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        views.push(into_view(&state.db, &state, row).await?);
    }
    Ok(Json(json!({
        "notifications": views,
        "total": total,
        "page": page.page(),
        "limit": page.limit(),
    })))
}

pub async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let count =
        aura_db::notifications::unread_notification_count(&state.db, auth.user_id, Utc::now())
            .await?;
    Ok(Json(json!({ "count": count })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetReadRequest {
    pub is_read: bool,
}

pub async fn set_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<SetReadRequest>,
) -> Result<Json<Value>, ApiError> {
    owned_notification(&state.db, id, auth.user_id).await?;
    let updated =
        aura_db::notifications::set_notification_read(&state.db, id, body.is_read, Utc::now())
            .await?;
    let view = into_view(&state.db, &state, updated).await?;
    Ok(Json(json!({ "notification": view })))
}

pub async fn read_all(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let updated =
        aura_db::notifications::mark_all_notifications_read(&state.db, auth.user_id, Utc::now())
            .await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    owned_notification(&state.db, id, auth.user_id).await?;
    aura_db::notifications::soft_delete_notification(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn owned_notification(
    pool: &DbPool,
    id: i64,
    user_id: i64,
) -> Result<NotificationRow, ApiError> {
    let row = aura_db::notifications::get_notification(pool, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if row.recipient_id != user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(row)
}

async fn into_view(
    pool: &DbPool,
    state: &AppState,
    row: NotificationRow,
) -> Result<NotificationView, ApiError> {
    let sender = match row.sender_id {
        Some(sender_id) => state.profiles.brief(pool, sender_id).await.ok(),
        None => None,
    };
    Ok(row.into_view(sender))
}
