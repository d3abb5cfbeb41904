use aura_core::AppState;
use aura_db::chats::ChatRow;
use aura_db::DbPool;
use aura_models::chat::{ChatKind, ChatSummary};
use aura_models::message::{MessageContent, MessageType};
use aura_util::pagination::{CursorParams, CursorResponse};
use aura_util::{snowflake, validation};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub participant_id: Option<i64>,
    pub name: Option<String>,
    #[serde(default)]
    pub participant_ids: Vec<i64>,
}

pub async fn create_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatSummary>), ApiError> {
    let kind = ChatKind::from_str(&body.kind)
        .map_err(|_| ApiError::BadRequest("type must be private or group".into()))?;
    let now = Utc::now();
    let (chat, created) = match kind {
        ChatKind::Private => {
            let other = body
                .participant_id
                .ok_or_else(|| ApiError::BadRequest("participantId is required".into()))?;
            if other == auth.user_id {
                return Err(ApiError::BadRequest(
                    "cannot open a private chat with yourself".into(),
                ));
            }
            aura_db::users::get_user_by_id(&state.db, other)
                .await?
                .ok_or(ApiError::NotFound)?;
            aura_db::chats::find_or_create_private_chat(
                &state.db,
                snowflake::generate(state.config.worker_id),
                auth.user_id,
                other,
                now,
            )
            .await?
        }
        ChatKind::Group => {
            let name = body
                .name
                .as_deref()
                .ok_or_else(|| ApiError::BadRequest("name is required".into()))?;
            validation::validate_chat_name(name)?;
            if body.participant_ids.is_empty() {
                return Err(ApiError::BadRequest("participantIds is required".into()));
            }
            let chat = aura_db::chats::create_group_chat(
                &state.db,
                snowflake::generate(state.config.worker_id),
                name,
                auth.user_id,
                &body.participant_ids,
                now,
            )
            .await?;
            (chat, true)
        }
    };

    let summary = chat_summary(&state.db, chat, auth.user_id).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}

pub async fn list_chats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let rows = aura_db::chats::chats_for_user(&state.db, auth.user_id).await?;
    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        summaries.push(chat_summary(&state.db, row, auth.user_id).await?);
    }
    Ok(Json(json!({ "chats": summaries })))
}

pub async fn get_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Query(params): Query<CursorParams>,
) -> Result<Json<CursorResponse<aura_models::message::MessageView>>, ApiError> {
    aura_db::chats::get_chat(&state.db, chat_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !aura_db::chats::is_participant(&state.db, chat_id, auth.user_id).await? {
        return Err(ApiError::Forbidden);
    }
    let limit = params.limit() as i64;
    // One extra row tells us whether an older page exists.
    let mut rows =
        aura_db::messages::chat_messages(&state.db, chat_id, params.before, limit + 1).await?;
    let has_more = rows.len() as i64 > limit;
    rows.truncate(limit as usize);
    let items = aura_db::messages::resolve_messages(&state.db, rows).await?;
    Ok(Json(CursorResponse { items, has_more }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub content: MessageContent,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub reply_to: Option<i64>,
}

pub async fn post_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Json(body): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let view = state
        .dispatcher
        .send_message(
            auth.user_id,
            chat_id,
            &body.content,
            body.message_type,
            body.reply_to,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": view }))))
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub text: String,
}

pub async fn edit_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(i64, i64)>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    ensure_message_in_chat(&state.db, chat_id, message_id).await?;
    let view = state
        .dispatcher
        .edit_message(auth.user_id, message_id, &body.text)
        .await?;
    Ok(Json(json!({ "message": view })))
}

pub async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    ensure_message_in_chat(&state.db, chat_id, message_id).await?;
    state
        .dispatcher
        .delete_message(auth.user_id, message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.dispatcher.mark_read(auth.user_id, None, chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_message_in_chat(
    pool: &DbPool,
    chat_id: i64,
    message_id: i64,
) -> Result<(), ApiError> {
    let row = aura_db::messages::get_message(pool, message_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if row.chat_id != chat_id {
        return Err(ApiError::NotFound);
    }
    Ok(())
}

async fn chat_summary(pool: &DbPool, row: ChatRow, user_id: i64) -> Result<ChatSummary, ApiError> {
    let participant_ids = aura_db::chats::participant_ids(pool, row.id).await?;
    let participants = aura_db::users::get_users_by_ids(pool, &participant_ids)
        .await?
        .into_iter()
        .map(|u| u.into_public())
        .collect();
    let last_message = match row.last_message_id {
        Some(message_id) => match aura_db::messages::get_message(pool, message_id).await? {
            Some(message) => Some(aura_db::messages::resolve_message(pool, message).await?),
            None => None,
        },
        None => None,
    };
    let unread_count = aura_db::messages::unread_count(pool, row.id, user_id).await?;
    Ok(ChatSummary {
        id: row.id,
        kind: ChatKind::from_str(&row.kind).unwrap_or(ChatKind::Private),
        name: row.name,
        admin_id: row.admin_id,
        participants,
        last_message,
        last_activity: row.last_activity,
        unread_count,
        created_at: row.created_at,
    })
}
