use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ws::{WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use application::{CreateChatRequest, CreateUserRequest, SendMessageRequest};
use domain::{Chat, ChatId, Message, User, UserId};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct CreateUserPayload {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreateChatPayload {
    id: String,
    members: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    from: String,
    chat_id: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    user_id: Option<String>,
    chat_id: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(create_user))
        .route("/chats", post(create_chat).get(list_user_chats))
        .route("/chats/{chat_id}", get(get_chat))
        .route("/messages", post(send_message).get(list_messages))
        .route("/ws", get(websocket_upgrade))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn require(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("missing query parameter {name}")))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(payload) = payload?;
    let user = state
        .chat_service
        .create_user(CreateUserRequest {
            id: payload.id,
            name: payload.name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

async fn create_chat(
    State(state): State<AppState>,
    payload: Result<Json<CreateChatPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Chat>), ApiError> {
    let Json(payload) = payload?;
    let chat = state
        .chat_service
        .create_chat(CreateChatRequest {
            id: payload.id,
            members: payload.members,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(chat)))
}

async fn list_user_chats(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<Chat>>, ApiError> {
    let Query(query) = query?;
    let user_id = UserId::parse(require(query.user_id, "user_id")?)?;
    let chats = state.chat_service.list_user_chats(&user_id).await?;
    Ok(Json(chats))
}

async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<Chat>, ApiError> {
    let chat_id = ChatId::parse(chat_id)?;
    let chat = state.chat_service.get_chat(&chat_id).await?;
    Ok(Json(chat))
}

/// REST 发送同样经过会话编排，在线订阅者会收到广播
async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessagePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let Json(payload) = payload?;
    let message = state
        .sessions
        .send_message(SendMessageRequest {
            from: UserId::parse(payload.from)?,
            chat_id: ChatId::parse(payload.chat_id)?,
            text: payload.text,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_messages(
    State(state): State<AppState>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let Query(query) = query?;
    let user_id = UserId::parse(require(query.user_id, "user_id")?)?;
    let chat_id = ChatId::parse(require(query.chat_id, "chat_id")?)?;
    let messages = state
        .chat_service
        .list_messages(&user_id, &chat_id)
        .await?;
    Ok(Json(messages))
}

async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let user_id = UserId::parse(require(query.user_id, "user_id")?)?;

    Ok(ws.on_upgrade(move |socket: WebSocket| async move {
        WebSocketConnection::new(socket, state.sessions, user_id)
            .run()
            .await;
    }))
}
