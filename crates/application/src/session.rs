//! 会话编排：把一条在线连接的入站事件路由到聊天服务和连接注册表。

use std::sync::Arc;

use domain::{ChatId, ErrorKind, Message, UserId};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApplicationError,
    registry::{ConnectionHandle, ConnectionId, ConnectionRegistry},
    sequencer::ChatSequencer,
    services::{ChatService, SendMessageRequest},
};

/// 客户端发来的事件。`chat_id` 保持原始字符串，进入会话后再校验。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Subscribe {
        chat_id: String,
    },
    Unsubscribe {
        chat_id: String,
    },
    #[serde(alias = "message")]
    Send {
        chat_id: String,
        text: String,
    },
}

/// 推给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// 订阅的聊天里有新消息
    Message { message: Message },
    /// 自己发送的消息已持久化
    Sent { message: Message },
    Error { code: ErrorKind, message: String },
}

impl OutboundEvent {
    pub fn error(code: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

impl From<&ApplicationError> for OutboundEvent {
    fn from(err: &ApplicationError) -> Self {
        Self::error(err.kind(), err.client_message())
    }
}

pub struct SessionOrchestrator {
    chat_service: Arc<ChatService>,
    registry: Arc<ConnectionRegistry>,
    sequencer: ChatSequencer,
}

impl SessionOrchestrator {
    pub fn new(chat_service: Arc<ChatService>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            chat_service,
            registry,
            sequencer: ChatSequencer::new(),
        }
    }

    pub fn chat_service(&self) -> &Arc<ChatService> {
        &self.chat_service
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// 注册连接并返回会话。同一用户的旧连接会被替换。
    pub async fn open(
        self: &Arc<Self>,
        user_id: UserId,
        handle: Arc<dyn ConnectionHandle>,
    ) -> Session {
        let connection_id = self.registry.register(user_id.clone(), handle).await;
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "session opened");
        Session {
            orchestrator: Arc::clone(self),
            user_id,
            connection_id,
        }
    }

    /// 持久化并广播一条消息。
    ///
    /// 同一聊天的发送串行执行，订阅者看到的顺序与提交顺序一致。
    /// 广播失败对发送者不可见。
    /// 提交与广播在独立任务中完成，调用方被取消后已提交的消息仍会广播。
    pub async fn send_message(
        self: &Arc<Self>,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let orchestrator = Arc::clone(self);
        match tokio::spawn(async move { orchestrator.commit_and_broadcast(request).await }).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "send task aborted");
                Err(ApplicationError::unavailable("send_message"))
            }
        }
    }

    async fn commit_and_broadcast(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let _turn = self.sequencer.enter(&request.chat_id).await;
        let message = self.chat_service.send_message(request).await?;
        let report = self.registry.broadcast(&message).await;
        tracing::debug!(
            message_id = %message.id,
            chat_id = %message.chat_id,
            delivered = report.delivered,
            failed = report.failed,
            "message broadcast"
        );
        Ok(message)
    }
}

/// 一条在线连接的会话。
///
/// 连接结束时必须调用 [`Session::close`]，它会消费会话，保证只注销一次。
pub struct Session {
    orchestrator: Arc<SessionOrchestrator>,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// 处理一条入站事件，返回只发给本连接的回复
    pub async fn handle(&self, event: InboundEvent) -> Option<OutboundEvent> {
        match event {
            InboundEvent::Subscribe { chat_id } => {
                let chat_id = match ChatId::parse(chat_id) {
                    Ok(id) => id,
                    Err(err) => return Some(OutboundEvent::error(err.kind(), err.to_string())),
                };
                self.orchestrator
                    .registry
                    .subscribe(&self.user_id, &chat_id)
                    .await;
                tracing::debug!(user_id = %self.user_id, chat_id = %chat_id, "subscribed");
                None
            }
            InboundEvent::Unsubscribe { chat_id } => {
                let chat_id = match ChatId::parse(chat_id) {
                    Ok(id) => id,
                    Err(err) => return Some(OutboundEvent::error(err.kind(), err.to_string())),
                };
                self.orchestrator
                    .registry
                    .unsubscribe(&self.user_id, &chat_id)
                    .await;
                None
            }
            InboundEvent::Send { chat_id, text } => {
                let chat_id = match ChatId::parse(chat_id) {
                    Ok(id) => id,
                    Err(err) => return Some(OutboundEvent::error(err.kind(), err.to_string())),
                };
                let request = SendMessageRequest {
                    from: self.user_id.clone(),
                    chat_id,
                    text,
                };
                match self.orchestrator.send_message(request).await {
                    Ok(message) => Some(OutboundEvent::Sent { message }),
                    Err(err) => {
                        tracing::info!(
                            user_id = %self.user_id,
                            error = %err,
                            "send rejected"
                        );
                        Some(OutboundEvent::from(&err))
                    }
                }
            }
        }
    }

    /// 结束会话并释放连接。连接已被同一用户的新连接替换时不影响新连接。
    pub async fn close(self) {
        let released = self
            .orchestrator
            .registry
            .release(&self.user_id, self.connection_id)
            .await;
        tracing::info!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            released,
            "session closed"
        );
    }
}
