//! 内存版持久化端口实现。
//!
//! 用于测试和单进程部署；每个操作在一把写锁内完成，主键唯一性在锁内检查。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use domain::{Chat, ChatId, Message, MessageId, RepositoryError, User, UserId};
use tokio::sync::RwLock;

use crate::repository::{ChatRepository, MessageRepository, UserRepository};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryChatRepository {
    chats: RwLock<HashMap<ChatId, Chat>>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let mut chats = self.chats.write().await;
        if chats.contains_key(&chat.id) {
            return Err(RepositoryError::Conflict);
        }
        chats.insert(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    async fn find_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError> {
        Ok(self.chats.read().await.get(id).cloned())
    }

    async fn list_by_member(&self, user_id: &UserId) -> Result<Vec<Chat>, RepositoryError> {
        let chats = self.chats.read().await;
        let mut found: Vec<Chat> = chats
            .values()
            .filter(|chat| chat.has_member(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

#[derive(Default)]
struct MessageLog {
    ids: HashSet<MessageId>,
    by_chat: HashMap<ChatId, Vec<Message>>,
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    log: RwLock<MessageLog>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut log = self.log.write().await;
        if !log.ids.insert(message.id.clone()) {
            return Err(RepositoryError::Conflict);
        }
        log.by_chat
            .entry(message.chat_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_by_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>, RepositoryError> {
        let log = self.log.read().await;
        Ok(log.by_chat.get(chat_id).cloned().unwrap_or_default())
    }
}
