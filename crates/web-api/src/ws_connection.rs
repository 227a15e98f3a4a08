use std::{sync::Arc, time::Duration};

use application::{
    ConnectionHandle, DeliveryError, InboundEvent, OutboundEvent, Session, SessionOrchestrator,
};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::ws::{Message as WsMessage, WebSocket},
};
use domain::{ErrorKind, Message, UserId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};

/// 每条连接的出站队列长度，写满后新的广播会被丢弃并记为投递失败
const OUTBOUND_CAPACITY: usize = 256;

/// 关闭连接时等待写任务刷完队列的最长时间
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// WebSocket 写操作命令
///
/// 所有对 sender 的写操作都经过同一个队列，由写任务串行执行
#[derive(Debug)]
enum WsCommand {
    Text(String),
    Pong(Bytes),
    Close,
}

/// 注册到 `ConnectionRegistry` 的句柄：只把消息放进出站队列，不直接写 socket
struct ChannelHandle {
    commands: mpsc::Sender<WsCommand>,
}

#[async_trait]
impl ConnectionHandle for ChannelHandle {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(&OutboundEvent::Message {
            message: message.clone(),
        })
        .map_err(|err| DeliveryError::failed(err.to_string()))?;

        self.commands
            .try_send(WsCommand::Text(payload))
            .map_err(|err| match err {
                TrySendError::Full(_) => DeliveryError::failed("outbound queue full"),
                TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }
}

/// 单条 WebSocket 连接
///
/// 读循环在当前任务里驱动 `Session`，写任务独占 socket 的发送端。
pub struct WebSocketConnection {
    socket: WebSocket,
    sessions: Arc<SessionOrchestrator>,
    user_id: UserId,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, sessions: Arc<SessionOrchestrator>, user_id: UserId) -> Self {
        Self {
            socket,
            sessions,
            user_id,
        }
    }

    pub async fn run(self) {
        let (mut sender, mut incoming) = self.socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(OUTBOUND_CAPACITY);

        let handle = Arc::new(ChannelHandle {
            commands: cmd_tx.clone(),
        });
        let session = self.sessions.open(self.user_id.clone(), handle).await;

        let mut send_task = tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                let frame = match cmd {
                    WsCommand::Text(text) => WsMessage::Text(text.into()),
                    WsCommand::Pong(data) => WsMessage::Pong(data),
                    WsCommand::Close => {
                        let _ = sender.send(WsMessage::Close(None)).await;
                        break;
                    }
                };
                if let Err(err) = sender.send(frame).await {
                    tracing::debug!(error = %err, "websocket write failed");
                    break;
                }
            }
        });

        while let Some(frame) = incoming.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::debug!(user_id = %session.user_id(), error = %err, "websocket read failed");
                    break;
                }
            };
            if !Self::handle_incoming(&session, frame, &cmd_tx).await {
                break;
            }
        }

        let user_id = session.user_id().clone();
        session.close().await;

        // 自己的回复先于 Close 入队，写任务会先把它们发完
        let _ = cmd_tx.send(WsCommand::Close).await;
        drop(cmd_tx);
        if tokio::time::timeout(CLOSE_GRACE, &mut send_task)
            .await
            .is_err()
        {
            send_task.abort();
        }
        tracing::info!(user_id = %user_id, "websocket connection closed");
    }

    /// 处理一帧入站数据，返回 false 表示应结束连接
    async fn handle_incoming(
        session: &Session,
        frame: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> bool {
        let reply = match frame {
            WsMessage::Text(text) => match serde_json::from_str::<InboundEvent>(text.as_str()) {
                Ok(event) => session.handle(event).await,
                Err(err) => Some(OutboundEvent::error(
                    ErrorKind::InvalidArgument,
                    format!("malformed event: {err}"),
                )),
            },
            WsMessage::Binary(_) => Some(OutboundEvent::error(
                ErrorKind::InvalidArgument,
                "binary frames are not supported",
            )),
            WsMessage::Ping(data) => {
                return cmd_tx.send(WsCommand::Pong(data)).await.is_ok();
            }
            WsMessage::Pong(_) => None,
            WsMessage::Close(_) => {
                tracing::debug!(user_id = %session.user_id(), "client closed websocket");
                return false;
            }
        };

        let Some(reply) = reply else {
            return true;
        };
        match serde_json::to_string(&reply) {
            Ok(payload) => cmd_tx.send(WsCommand::Text(payload)).await.is_ok(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize websocket reply");
                true
            }
        }
    }
}
