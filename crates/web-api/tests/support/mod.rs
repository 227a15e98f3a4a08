#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use application::{
    ChatService, ChatServiceDependencies, ConnectionRegistry, InMemoryChatRepository,
    InMemoryMessageRepository, InMemoryUserRepository, RandomMessageIdGenerator,
    SessionOrchestrator, SystemClock,
};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub fn build_router() -> (Router, Arc<SessionOrchestrator>) {
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        user_repository: Arc::new(InMemoryUserRepository::new()),
        chat_repository: Arc::new(InMemoryChatRepository::new()),
        message_repository: Arc::new(InMemoryMessageRepository::new()),
        clock: Arc::new(SystemClock::default()),
        id_generator: Arc::new(RandomMessageIdGenerator::default()),
        storage_timeout: Duration::from_secs(2),
    }));
    let sessions = Arc::new(SessionOrchestrator::new(
        chat_service,
        Arc::new(ConnectionRegistry::new()),
    ));
    (router(AppState::new(sessions.clone())), sessions)
}

/// 监听随机端口的测试服务器，drop 时优雅关闭
pub struct TestServer {
    pub base_http: String,
    pub base_ws: String,
    pub client: Client,
    sessions: Arc<SessionOrchestrator>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let (router, sessions) = build_router();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            base_http: format!("http://{addr}"),
            base_ws: format!("ws://{addr}"),
            client: Client::new(),
            sessions,
            shutdown: Some(shutdown_tx),
        }
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base_http, path))
            .json(&body)
            .send()
            .await
            .expect("send request");
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{}", self.base_http, path))
            .send()
            .await
            .expect("send request");
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn create_user(&self, id: &str, name: &str) {
        let (status, body) = self.post("/users", json!({ "id": id, "name": name })).await;
        assert_eq!(status, StatusCode::CREATED, "create user {id}: {body}");
    }

    pub async fn create_chat(&self, id: &str, members: &[&str]) {
        let (status, body) = self
            .post("/chats", json!({ "id": id, "members": members }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create chat {id}: {body}");
    }

    /// 注册表中的在线连接数
    pub async fn connection_count(&self) -> usize {
        self.sessions.registry().connection_count().await
    }

    /// 轮询直到在线连接数降到 `expected`，超时返回 false
    pub async fn wait_for_connections(&self, expected: usize) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if self.connection_count().await == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    pub async fn connect(&self, user_id: &str) -> WsClient {
        let (ws, _) = connect_async(format!("{}/ws?user_id={user_id}", self.base_ws))
            .await
            .expect("websocket connect");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_event(ws: &mut WsClient, event: Value) {
    ws.send(TungsteniteMessage::text(event.to_string()))
        .await
        .expect("send websocket event");
}

/// 发送 ping 并等到 pong，保证之前发出的帧都已被服务端处理
pub async fn sync(ws: &mut WsClient) {
    ws.send(TungsteniteMessage::Ping(b"sync".to_vec().into()))
        .await
        .expect("send ping");
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("pong timeout")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Pong(_) = frame {
            return;
        }
    }
}

/// 读取下一条 JSON 文本帧；超时返回 None
pub async fn next_event(ws: &mut WsClient, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match frame.expect("websocket error") {
            TungsteniteMessage::Text(text) => {
                return Some(serde_json::from_str(text.as_str()).expect("json event"));
            }
            TungsteniteMessage::Close(_) => return None,
            _ => continue,
        }
    }
}
