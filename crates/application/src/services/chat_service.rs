use std::{future::Future, sync::Arc, time::Duration};

use domain::{
    Chat, ChatId, DomainError, Message, RepositoryError, User, UserId, UserName,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    id_generator::MessageIdGenerator,
    repository::{ChatRepository, MessageRepository, UserRepository},
};

/// 存储调用的默认超时
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CreateChatRequest {
    pub id: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub from: UserId,
    pub chat_id: ChatId,
    pub text: String,
}

pub struct ChatServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub chat_repository: Arc<dyn ChatRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
    pub id_generator: Arc<dyn MessageIdGenerator>,
    pub storage_timeout: Duration,
}

/// 聊天领域规则的唯一裁决者。
///
/// 服务本身无状态：每次调用都重新检查用户、聊天是否存在以及成员关系，
/// 跨调用的竞争交给存储层的唯一约束处理。所有校验通过前不会发生任何写入。
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 给存储调用加上超时，超时统一报告为 Unavailable
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, ApplicationError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        match tokio::time::timeout(self.deps.storage_timeout, call).await {
            Ok(result) => result.map_err(|err| {
                if let RepositoryError::Storage { message } = &err {
                    tracing::error!(operation, error = %message, "storage call failed");
                }
                ApplicationError::from(err)
            }),
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.deps.storage_timeout.as_millis() as u64,
                    "storage call timed out"
                );
                Err(ApplicationError::unavailable(operation))
            }
        }
    }

    async fn require_user(&self, user_id: &UserId) -> Result<User, ApplicationError> {
        self.bounded("find_user", self.deps.user_repository.find_by_id(user_id))
            .await?
            .ok_or_else(|| DomainError::UserNotFound.into())
    }

    async fn require_chat(&self, chat_id: &ChatId) -> Result<Chat, ApplicationError> {
        self.bounded("find_chat", self.deps.chat_repository.find_by_id(chat_id))
            .await?
            .ok_or_else(|| DomainError::ChatNotFound.into())
    }

    /// 读取聊天并确认用户是成员
    async fn require_membership(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
    ) -> Result<Chat, ApplicationError> {
        let chat = self.require_chat(chat_id).await?;
        if !chat.has_member(user_id) {
            tracing::debug!(user_id = %user_id, chat_id = %chat_id, "user is not a chat member");
            return Err(DomainError::UserNotInChat.into());
        }
        Ok(chat)
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, ApplicationError> {
        let id = UserId::parse(request.id)?;
        let name = UserName::parse(request.name)?;
        let user = User::new(id, name);

        let created = self
            .bounded("create_user", self.deps.user_repository.create(user.clone()))
            .await
            .map_err(|err| match err {
                ApplicationError::Repository(RepositoryError::Conflict) => {
                    DomainError::UserAlreadyExists(user.id.to_string()).into()
                }
                other => other,
            })?;

        tracing::info!(user_id = %created.id, "user created");
        Ok(created)
    }

    pub async fn create_chat(&self, request: CreateChatRequest) -> Result<Chat, ApplicationError> {
        let id = ChatId::parse(request.id)?;
        let members = request
            .members
            .into_iter()
            .map(UserId::parse)
            .collect::<Result<Vec<_>, _>>()?;

        // 数量和重复检查先于任何存在性查询
        let chat = Chat::new(id, members)?;

        // 按列表顺序检查，遇到第一个不存在的用户即返回
        for member in &chat.members {
            self.require_user(member).await?;
        }

        let created = self
            .bounded("create_chat", self.deps.chat_repository.create(chat.clone()))
            .await
            .map_err(|err| match err {
                ApplicationError::Repository(RepositoryError::Conflict) => {
                    DomainError::ChatAlreadyExists(chat.id.to_string()).into()
                }
                other => other,
            })?;

        tracing::info!(chat_id = %created.id, members = created.members.len(), "chat created");
        Ok(created)
    }

    /// 发送消息。检查顺序：发送者存在 → 聊天存在 → 发送者是成员。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        self.require_user(&request.from).await?;
        self.require_membership(&request.from, &request.chat_id)
            .await?;

        let message = Message::new(
            self.deps.id_generator.next_id(),
            request.from,
            request.chat_id,
            request.text,
            self.deps.clock.now(),
        );

        let stored = self
            .bounded(
                "create_message",
                self.deps.message_repository.create(message.clone()),
            )
            .await
            .map_err(|err| match err {
                ApplicationError::Repository(RepositoryError::Conflict) => {
                    DomainError::MessageAlreadyExists(message.id.to_string()).into()
                }
                other => other,
            })?;

        tracing::debug!(
            message_id = %stored.id,
            chat_id = %stored.chat_id,
            from = %stored.from,
            "message stored"
        );
        Ok(stored)
    }

    /// 列出聊天消息，最早的在前。只检查聊天存在和成员关系，不单独检查请求者是否存在。
    pub async fn list_messages(
        &self,
        requesting_user: &UserId,
        chat_id: &ChatId,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.require_membership(requesting_user, chat_id).await?;
        self.bounded(
            "list_messages",
            self.deps.message_repository.list_by_chat(chat_id),
        )
        .await
    }

    pub async fn list_user_chats(&self, user_id: &UserId) -> Result<Vec<Chat>, ApplicationError> {
        self.require_user(user_id).await?;
        self.bounded(
            "list_chats",
            self.deps.chat_repository.list_by_member(user_id),
        )
        .await
    }

    pub async fn get_chat(&self, chat_id: &ChatId) -> Result<Chat, ApplicationError> {
        self.require_chat(chat_id).await
    }
}
