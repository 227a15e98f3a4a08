//! 持久化端口。
//!
//! `ChatService` 只依赖这三个 trait，具体存储（内存、PostgreSQL）在外部注入。
//! 创建时主键重复必须返回 `RepositoryError::Conflict`。

use async_trait::async_trait;
use domain::{Chat, ChatId, Message, RepositoryError, User, UserId};

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError>;
    async fn find_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError>;
    // 返回成员列表包含该用户的所有聊天，顺序不做保证
    async fn list_by_member(&self, user_id: &UserId) -> Result<Vec<Chat>, RepositoryError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError>;
    // 按创建顺序返回，最早的在前
    async fn list_by_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>, RepositoryError>;
}
