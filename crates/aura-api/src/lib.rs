use aura_core::AppState;
use axum::{
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;

pub mod error;
pub mod middleware;
pub mod routes;

pub fn api_router() -> Router<AppState> {
    let cors = build_cors_layer();
    Router::new()
        // Health
        .route("/health", get(health))
        // Auth
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/me", get(routes::auth::me))
        // Users & friends
        .route("/api/users/profile", put(routes::users::update_profile))
        .route("/api/users/friends", get(routes::users::list_friends))
        .route(
            "/api/users/friend-requests",
            get(routes::users::list_friend_requests),
        )
        .route("/api/users/{user_id}", get(routes::users::get_user))
        .route(
            "/api/users/{user_id}/friend-request",
            post(routes::users::send_friend_request),
        )
        .route(
            "/api/users/{user_id}/accept-friend",
            post(routes::users::accept_friend),
        )
        .route(
            "/api/users/{user_id}/reject-friend",
            post(routes::users::reject_friend),
        )
        .route(
            "/api/users/{user_id}/unfriend",
            delete(routes::users::unfriend),
        )
        // Chats & messages
        .route(
            "/api/chats",
            get(routes::chats::list_chats).post(routes::chats::create_chat),
        )
        .route(
            "/api/chats/{chat_id}/messages",
            get(routes::chats::get_messages).post(routes::chats::post_message),
        )
        .route(
            "/api/chats/{chat_id}/messages/{message_id}",
            put(routes::chats::edit_message).delete(routes::chats::delete_message),
        )
        .route("/api/chats/{chat_id}/read", post(routes::chats::mark_read))
        // Notifications
        .route(
            "/api/notifications",
            get(routes::notifications::list),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::notifications::unread_count),
        )
        .route(
            "/api/notifications/read-all",
            put(routes::notifications::read_all),
        )
        .route(
            "/api/notifications/{id}",
            put(routes::notifications::set_read).delete(routes::notifications::delete),
        )
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok", "service": "aura" })))
}
