use aura_core::error::CoreError;
use aura_core::events::Recipients;
use aura_core::rooms::RoomId;
use aura_core::AppState;
use aura_models::socket::*;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::OnceLock;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::session::Session;

/// The first frame must be a valid `authenticate` within this window.
const AUTH_TIMEOUT_SECS: u64 = 30;
const AUTH_ATTEMPTS_PER_MINUTE: u32 = 10;
const MESSAGES_PER_MINUTE: u32 = 240;
const TYPING_EVENTS_PER_MINUTE: u32 = 120;

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

/// Rate limiters shared across connections: message and typing budgets are
/// keyed per user so extra tabs don't multiply them, authentication attempts
/// per peer address so a bad actor can't brute-force tokens by reconnecting.
struct GatewayRateLimits {
    auth: DefaultKeyedRateLimiter<IpAddr>,
    messages: DefaultKeyedRateLimiter<i64>,
    typing: DefaultKeyedRateLimiter<i64>,
}

static GATEWAY_RATE_LIMITS: OnceLock<GatewayRateLimits> = OnceLock::new();

fn gateway_rate_limits() -> &'static GatewayRateLimits {
    GATEWAY_RATE_LIMITS.get_or_init(|| {
        // Periodic cleanup of stale rate limiter entries to prevent
        // unbounded memory growth.
        tokio::spawn(async {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            interval.tick().await; // skip immediate first tick
            loop {
                interval.tick().await;
                let rl = gateway_rate_limits();
                rl.auth.retain_recent();
                rl.messages.retain_recent();
                rl.typing.retain_recent();
                rl.auth.shrink_to_fit();
                rl.messages.shrink_to_fit();
                rl.typing.shrink_to_fit();
            }
        });
        GatewayRateLimits {
            auth: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(AUTH_ATTEMPTS_PER_MINUTE).unwrap(),
            )),
            messages: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(MESSAGES_PER_MINUTE).unwrap(),
            )),
            typing: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(TYPING_EVENTS_PER_MINUTE).unwrap(),
            )),
        }
    })
}

pub async fn handle_connection(socket: WebSocket, state: AppState, peer: IpAddr) {
    let (mut sender, mut receiver) = socket.split();

    let rate_limits = gateway_rate_limits();
    if rate_limits.auth.check_key(&peer).is_err() {
        let _ = send_error(&mut sender, "too many authentication attempts").await;
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4001,
                reason: "authentication failed".into(),
            })))
            .await;
        return;
    }

    let user_id = match authenticate(&mut receiver, &state).await {
        Ok(user_id) => user_id,
        Err(reason) => {
            let _ = send_error(&mut sender, reason).await;
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: 4001,
                    reason: "authentication failed".into(),
                })))
                .await;
            return;
        }
    };

    let session = Session::new(user_id);
    // Subscribe before joining rooms so nothing published during setup is lost.
    let mut event_rx = state.event_bus.subscribe();
    state.presence.connect(session.connection_id, user_id).await;

    match state.profiles.get(&state.db, user_id).await {
        Ok(profile) => {
            let _ = send_frame(
                &mut sender,
                SocketFrame::new(EVENT_CONNECTED, json!({ "user": profile })),
            )
            .await;
        }
        Err(err) => warn!(user_id, error = %err, "failed to load profile for connected event"),
    }
    info!(user_id, connection_id = %session.connection_id, "socket connected");

    let mut ping_interval = tokio::time::interval(Duration::from_secs(20));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let disconnect_reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match serde_json::from_str::<SocketFrame>(&text) {
                            Ok(frame) => frame,
                            Err(_) => {
                                let _ = send_error(&mut sender, "malformed frame").await;
                                continue;
                            }
                        };
                        let typing_signal = frame.event == CLIENT_TYPING_START
                            || frame.event == CLIENT_TYPING_STOP;
                        if typing_signal {
                            if rate_limits.typing.check_key(&user_id).is_err() {
                                // Silent drop for high-frequency signals.
                                debug!(user_id, "typing signal rate limited");
                                continue;
                            }
                        } else if rate_limits.messages.check_key(&user_id).is_err() {
                            let _ = send_error(&mut sender, "rate limited").await;
                            continue;
                        }
                        if let Err(err) = handle_frame(&frame, &mut sender, &session, &state).await {
                            let _ = send_error(&mut sender, &err.to_string()).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break "client close frame",
                    Some(Err(_)) => break "websocket receive error",
                    None => break "websocket stream ended",
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                use tokio::sync::broadcast::error::RecvError;
                match event {
                    Ok(event) => {
                        if !state.rooms.should_deliver(session.connection_id, &event) {
                            continue;
                        }
                        let frame = SocketFrame::new(&event.event_type, event.payload);
                        if send_frame(&mut sender, frame).await.is_err() {
                            break "websocket send error";
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(user_id, skipped, "event stream lagged; forcing reconnect");
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: 1013,
                                reason: "event stream fell behind".into(),
                            })))
                            .await;
                        break "event stream lagged";
                    }
                    Err(RecvError::Closed) => break "event stream closed",
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error";
                }
            }
            _ = state.shutdown.notified() => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "server shutting down".into(),
                    })))
                    .await;
                break "server shutdown";
            }
        }
    };

    state.presence.disconnect(session.connection_id).await;
    info!(
        user_id,
        connection_id = %session.connection_id,
        reason = disconnect_reason,
        "socket disconnected"
    );
}

/// Wait for the opening `authenticate` frame and resolve it to a user.
/// Nothing is joined or registered until this succeeds.
async fn authenticate(receiver: &mut WsReceiver, state: &AppState) -> Result<i64, &'static str> {
    let first = tokio::time::timeout(Duration::from_secs(AUTH_TIMEOUT_SECS), receiver.next())
        .await
        .map_err(|_| "authentication timed out")?;
    let text = match first {
        Some(Ok(Message::Text(text))) => text,
        _ => return Err("expected authenticate frame"),
    };
    resolve_authentication(&text, state).await
}

async fn resolve_authentication(text: &str, state: &AppState) -> Result<i64, &'static str> {
    let frame: SocketFrame =
        serde_json::from_str(text).map_err(|_| "expected authenticate frame")?;
    if frame.event != CLIENT_AUTHENTICATE {
        return Err("expected authenticate frame");
    }
    let payload: AuthenticatePayload =
        serde_json::from_value(frame.data).map_err(|_| "expected authenticate frame")?;
    let claims = aura_core::auth::validate_token(&payload.token, &state.config.jwt_secret)
        .map_err(|_| "invalid token")?;
    let user = aura_db::users::get_user_by_id(&state.db, claims.sub)
        .await
        .map_err(|_| "internal error")?;
    match user {
        Some(user) => Ok(user.id),
        None => Err("invalid token"),
    }
}

async fn handle_frame(
    frame: &SocketFrame,
    sender: &mut WsSender,
    session: &Session,
    state: &AppState,
) -> Result<(), CoreError> {
    let conn = session.connection_id;
    let user_id = session.user_id;
    match frame.event.as_str() {
        // Repeated authenticate frames on a live session are a no-op.
        CLIENT_AUTHENTICATE => Ok(()),
        CLIENT_JOIN_CHAT => {
            let p: ChatPayload = parse(frame)?;
            state
                .rooms
                .join_chat_room(&state.db, conn, user_id, p.chat_id)
                .await?;
            let _ = send_frame(
                sender,
                SocketFrame::new(EVENT_JOINED_CHAT, json!({ "chatId": p.chat_id })),
            )
            .await;
            state.event_bus.dispatch_excluding(
                EVENT_USER_JOINED_CHAT,
                json!({ "chatId": p.chat_id, "userId": user_id }),
                Recipients::Chat(p.chat_id),
                conn,
            );
            Ok(())
        }
        CLIENT_LEAVE_CHAT => {
            let p: ChatPayload = parse(frame)?;
            state.rooms.leave_room(conn, RoomId::Chat(p.chat_id));
            state.event_bus.dispatch_excluding(
                EVENT_USER_LEFT_CHAT,
                json!({ "chatId": p.chat_id, "userId": user_id }),
                Recipients::Chat(p.chat_id),
                conn,
            );
            Ok(())
        }
        CLIENT_SEND_MESSAGE => {
            let p: SendMessagePayload = parse(frame)?;
            state
                .dispatcher
                .send_message(user_id, p.chat_id, &p.content, p.message_type, p.reply_to)
                .await?;
            Ok(())
        }
        CLIENT_TYPING_START | CLIENT_TYPING_STOP => {
            let p: ChatPayload = parse(frame)?;
            let is_typing = frame.event == CLIENT_TYPING_START;
            state
                .typing
                .signal(
                    &state.db,
                    &state.event_bus,
                    conn,
                    user_id,
                    p.chat_id,
                    is_typing,
                    Utc::now(),
                )
                .await
        }
        CLIENT_ADD_REACTION => {
            let p: ReactionPayload = parse(frame)?;
            state
                .dispatcher
                .add_reaction(user_id, p.message_id, &p.emoji)
                .await
        }
        CLIENT_REMOVE_REACTION => {
            let p: RemoveReactionPayload = parse(frame)?;
            state.dispatcher.remove_reaction(user_id, p.message_id).await
        }
        CLIENT_MARK_MESSAGES_READ => {
            let p: ChatPayload = parse(frame)?;
            state
                .dispatcher
                .mark_read(user_id, Some(conn), p.chat_id)
                .await
        }
        CLIENT_SEND_FRIEND_REQUEST => {
            // Live relay only; the durable request row and notification are
            // created by the REST route.
            let p: FriendRequestPayload = parse(frame)?;
            aura_db::users::get_user_by_id(&state.db, p.target_user_id)
                .await?
                .ok_or(CoreError::NotFound)?;
            if state.registry.is_online(p.target_user_id) {
                let brief = state.profiles.brief(&state.db, user_id).await?;
                state.event_bus.dispatch(
                    EVENT_FRIEND_REQUEST_RECEIVED,
                    json!({ "sender": brief }),
                    Recipients::User(p.target_user_id),
                );
            }
            Ok(())
        }
        CLIENT_SHARE_EMOTION => {
            let p: ShareEmotionPayload = parse(frame)?;
            let emotion = aura_db::emotions::get_emotion(&state.db, p.emotion_id)
                .await?
                .ok_or(CoreError::NotFound)?;
            if emotion.user_id != user_id {
                return Err(CoreError::AccessDenied);
            }
            let view = emotion.into_view();
            let brief = state.profiles.brief(&state.db, user_id).await?;
            let now = Utc::now();
            for recipient in p.recipients {
                if state.registry.is_online(recipient) {
                    state.event_bus.dispatch(
                        EVENT_EMOTION_SHARED,
                        json!({ "emotion": view, "sender": brief }),
                        Recipients::User(recipient),
                    );
                } else {
                    state.notifier.enqueue(state.notifier.emotion_notification(
                        recipient,
                        &brief,
                        p.emotion_id,
                        now,
                    ));
                }
            }
            Ok(())
        }
        CLIENT_MARK_NOTIFICATION_READ => {
            let p: MarkNotificationPayload = parse(frame)?;
            let row = aura_db::notifications::get_notification(&state.db, p.notification_id)
                .await?
                .ok_or(CoreError::NotFound)?;
            if row.recipient_id != user_id {
                return Err(CoreError::AccessDenied);
            }
            let updated =
                aura_db::notifications::set_notification_read(&state.db, p.notification_id, true, Utc::now())
                    .await?;
            let sender_brief = match updated.sender_id {
                Some(sender_id) => state.profiles.brief(&state.db, sender_id).await.ok(),
                None => None,
            };
            let view = updated.into_view(sender_brief);
            let _ = send_frame(
                sender,
                SocketFrame::new(EVENT_NOTIFICATION_UPDATED, json!({ "notification": view })),
            )
            .await;
            Ok(())
        }
        other => Err(CoreError::InvalidContent(format!("unknown event {other}"))),
    }
}

fn parse<T: DeserializeOwned>(frame: &SocketFrame) -> Result<T, CoreError> {
    serde_json::from_value(frame.data.clone())
        .map_err(|_| CoreError::InvalidContent(format!("malformed {} payload", frame.event)))
}

async fn send_frame(sender: &mut WsSender, frame: SocketFrame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(&frame).unwrap_or_default();
    sender.send(Message::Text(text.into())).await
}

async fn send_error(sender: &mut WsSender, message: &str) -> Result<(), axum::Error> {
    send_frame(
        sender,
        SocketFrame::new(EVENT_ERROR, json!({ "message": message })),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::{AppConfig, AppState};

    const SECRET: &str = "gateway-test-secret";

    async fn test_state() -> AppState {
        let pool = aura_db::create_pool("sqlite::memory:", 1).await.unwrap();
        aura_db::run_migrations(&pool).await.unwrap();
        AppState::new(
            pool,
            AppConfig {
                jwt_secret: SECRET.to_string(),
                jwt_expiry_seconds: 3600,
                registration_enabled: true,
                worker_id: 1,
            },
        )
    }

    async fn seed_user(state: &AppState, id: i64) {
        aura_db::users::create_user(
            &state.db,
            id,
            "Ada",
            &format!("user{id}@example.com"),
            "hash",
            Utc::now(),
        )
        .await
        .unwrap();
    }

    fn auth_frame(token: &str) -> String {
        serde_json::to_string(&SocketFrame::new(
            CLIENT_AUTHENTICATE,
            json!({ "token": token }),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_resolves_to_user() {
        let state = test_state().await;
        seed_user(&state, 42).await;
        let token = aura_core::auth::create_token(42, SECRET, 3600).unwrap();
        let user_id = resolve_authentication(&auth_frame(&token), &state)
            .await
            .unwrap();
        assert_eq!(user_id, 42);
    }

    #[tokio::test]
    async fn wrong_first_event_is_rejected() {
        let state = test_state().await;
        let err = resolve_authentication(r#"{"event":"join_chat","data":{"chatId":1}}"#, &state)
            .await
            .unwrap_err();
        assert_eq!(err, "expected authenticate frame");
    }

    #[tokio::test]
    async fn malformed_frame_is_rejected() {
        let state = test_state().await;
        let err = resolve_authentication("not json", &state).await.unwrap_err();
        assert_eq!(err, "expected authenticate frame");
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let state = test_state().await;
        let err = resolve_authentication(r#"{"event":"authenticate","data":{}}"#, &state)
            .await
            .unwrap_err();
        assert_eq!(err, "expected authenticate frame");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let state = test_state().await;
        let err = resolve_authentication(&auth_frame("not-a-jwt"), &state)
            .await
            .unwrap_err();
        assert_eq!(err, "invalid token");
    }

    #[tokio::test]
    async fn token_signed_with_wrong_secret_is_rejected() {
        let state = test_state().await;
        seed_user(&state, 42).await;
        let token = aura_core::auth::create_token(42, "some-other-secret", 3600).unwrap();
        let err = resolve_authentication(&auth_frame(&token), &state)
            .await
            .unwrap_err();
        assert_eq!(err, "invalid token");
    }

    #[tokio::test]
    async fn token_for_unknown_user_is_rejected() {
        let state = test_state().await;
        let token = aura_core::auth::create_token(999, SECRET, 3600).unwrap();
        let err = resolve_authentication(&auth_frame(&token), &state)
            .await
            .unwrap_err();
        assert_eq!(err, "invalid token");
    }

    #[tokio::test]
    async fn auth_attempts_per_peer_are_limited() {
        let limits = gateway_rate_limits();
        let peer: IpAddr = "203.0.113.7".parse().unwrap();
        for _ in 0..AUTH_ATTEMPTS_PER_MINUTE {
            assert!(limits.auth.check_key(&peer).is_ok());
        }
        assert!(limits.auth.check_key(&peer).is_err());
        // A different peer keeps its own budget.
        let other: IpAddr = "203.0.113.8".parse().unwrap();
        assert!(limits.auth.check_key(&other).is_ok());
    }

    #[test]
    fn malformed_payload_maps_to_invalid_content() {
        let frame = SocketFrame::new(CLIENT_JOIN_CHAT, json!({ "chatId": "nope" }));
        let err = parse::<ChatPayload>(&frame).unwrap_err();
        assert!(matches!(err, CoreError::InvalidContent(_)));
    }
}
