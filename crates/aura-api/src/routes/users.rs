use aura_core::events::Recipients;
use aura_core::AppState;
use aura_models::socket::EVENT_FRIEND_REQUEST_RECEIVED;
use aura_models::user::UserBrief;
use aura_util::{snowflake, validation};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let profile = state.profiles.get(&state.db, user_id).await?;
    let is_friend = aura_db::friendships::are_friends(&state.db, auth.user_id, user_id).await?;
    let has_sent = aura_db::friendships::get_friend_request(&state.db, auth.user_id, user_id)
        .await?
        .is_some();
    let has_received = aura_db::friendships::get_friend_request(&state.db, user_id, auth.user_id)
        .await?
        .is_some();
    Ok(Json(json!({
        "user": profile,
        "isFriend": is_friend,
        "hasSentRequest": has_sent,
        "hasReceivedRequest": has_received,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(name) = body.name.as_deref() {
        validation::validate_display_name(name)?;
    }
    if let Some(bio) = body.bio.as_deref() {
        validation::validate_bio(bio)?;
    }
    let updated = aura_db::users::update_profile(
        &state.db,
        auth.user_id,
        body.name.as_deref().map(str::trim),
        body.bio.as_deref(),
        body.avatar.as_deref(),
    )
    .await?;
    state.profiles.invalidate(auth.user_id).await;
    Ok(Json(json!({ "user": updated.into_public() })))
}

pub async fn list_friends(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let friends = aura_db::friendships::friends_with_since(&state.db, auth.user_id).await?;
    let entries: Vec<Value> = friends
        .into_iter()
        .map(|f| {
            let since = f.since;
            json!({ "user": f.user.into_public(), "friendsSince": since })
        })
        .collect();
    Ok(Json(json!({ "friends": entries })))
}

pub async fn list_friend_requests(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let received = aura_db::friendships::pending_requests_for(&state.db, auth.user_id).await?;
    let sent = aura_db::friendships::pending_requests_from(&state.db, auth.user_id).await?;

    let mut ids: Vec<i64> = received.iter().map(|r| r.sender_id).collect();
    ids.extend(sent.iter().map(|r| r.recipient_id));
    let users = aura_db::users::get_users_by_ids(&state.db, &ids).await?;
    let brief = |id: i64| -> Option<UserBrief> {
        users.iter().find(|u| u.id == id).map(|u| u.brief())
    };

    let received: Vec<Value> = received
        .iter()
        .map(|r| json!({ "id": r.id, "sender": brief(r.sender_id), "createdAt": r.created_at }))
        .collect();
    let sent: Vec<Value> = sent
        .iter()
        .map(|r| json!({ "id": r.id, "recipient": brief(r.recipient_id), "createdAt": r.created_at }))
        .collect();
    Ok(Json(json!({ "received": received, "sent": sent })))
}

pub async fn send_friend_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_id): Path<i64>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if target_id == auth.user_id {
        return Err(ApiError::BadRequest(
            "cannot send a friend request to yourself".into(),
        ));
    }
    aura_db::users::get_user_by_id(&state.db, target_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if aura_db::friendships::are_friends(&state.db, auth.user_id, target_id).await? {
        return Err(ApiError::Conflict("already friends".into()));
    }
    if aura_db::friendships::get_friend_request(&state.db, auth.user_id, target_id)
        .await?
        .is_some()
        || aura_db::friendships::get_friend_request(&state.db, target_id, auth.user_id)
            .await?
            .is_some()
    {
        return Err(ApiError::Conflict("friend request already pending".into()));
    }

    let now = Utc::now();
    let request = aura_db::friendships::create_friend_request(
        &state.db,
        snowflake::generate(state.config.worker_id),
        auth.user_id,
        target_id,
        now,
    )
    .await?;

    let sender = state.profiles.brief(&state.db, auth.user_id).await?;
    state
        .notifier
        .enqueue(state.notifier.friend_request_notification(target_id, &sender, now));
    if state.registry.is_online(target_id) {
        state.event_bus.dispatch(
            EVENT_FRIEND_REQUEST_RECEIVED,
            json!({ "sender": sender }),
            Recipients::User(target_id),
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": request.id, "recipientId": target_id, "createdAt": request.created_at })),
    ))
}

pub async fn accept_friend(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(sender_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let request = aura_db::friendships::get_friend_request(&state.db, sender_id, auth.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let now = Utc::now();
    aura_db::friendships::add_friendship(&state.db, auth.user_id, sender_id, now).await?;
    aura_db::friendships::delete_friend_request(&state.db, request.id).await?;

    let accepter = state.profiles.brief(&state.db, auth.user_id).await?;
    state.notifier.enqueue(
        state
            .notifier
            .friend_request_accepted_notification(sender_id, &accepter, now),
    );

    let friend = state.profiles.get(&state.db, sender_id).await?;
    Ok(Json(json!({ "friend": friend })))
}

pub async fn reject_friend(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(sender_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let request = aura_db::friendships::get_friend_request(&state.db, sender_id, auth.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    aura_db::friendships::delete_friend_request(&state.db, request.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfriend(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(friend_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    aura_db::users::get_user_by_id(&state.db, friend_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let removed = aura_db::friendships::remove_friendship(&state.db, auth.user_id, friend_id).await?;
    if removed == 0 {
        return Err(ApiError::BadRequest("not friends with this user".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}
