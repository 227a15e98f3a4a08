//! 连接注册表与广播。
//!
//! 记录当前在线用户的连接句柄，以及每个聊天的订阅者集合。
//! 锁只保护映射本身：广播先在锁内拷贝订阅者快照，释放锁后再并发投递，
//! 慢客户端不会阻塞其他用户的注册和订阅。

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use domain::{ChatId, Message, UserId};
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("delivery failed: {0}")]
    Failed(String),
}

impl DeliveryError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 一条在线连接的出站句柄，传输层负责实现
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// 注册表分配的连接编号，进程内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Connection {
    id: ConnectionId,
    handle: Arc<dyn ConnectionHandle>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<UserId, Connection>,
    subscribers: HashMap<ChatId, HashSet<UserId>>,
    // 反向索引，注销时不必扫描所有聊天
    subscriptions: HashMap<UserId, HashSet<ChatId>>,
}

impl RegistryState {
    fn drop_subscriptions(&mut self, user_id: &UserId) -> usize {
        let Some(chats) = self.subscriptions.remove(user_id) else {
            return 0;
        };
        let count = chats.len();
        for chat_id in chats {
            if let Some(users) = self.subscribers.get_mut(&chat_id) {
                users.remove(user_id);
                if users.is_empty() {
                    self.subscribers.remove(&chat_id);
                }
            }
        }
        count
    }

    fn remove_connection(&mut self, user_id: &UserId) -> bool {
        let removed = self.connections.remove(user_id).is_some();
        self.drop_subscriptions(user_id);
        removed
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    next_connection: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装或替换用户的连接句柄。替换时旧连接的订阅一并清除。
    pub async fn register(
        &self,
        user_id: UserId,
        handle: Arc<dyn ConnectionHandle>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed) + 1);
        let mut state = self.state.write().await;

        let replaced = state
            .connections
            .insert(user_id.clone(), Connection { id, handle });
        if let Some(previous) = replaced {
            let dropped = state.drop_subscriptions(&user_id);
            tracing::info!(
                user_id = %user_id,
                connection_id = %id,
                previous = %previous.id,
                dropped_subscriptions = dropped,
                "connection replaced"
            );
        } else {
            tracing::debug!(user_id = %user_id, connection_id = %id, "connection registered");
        }
        id
    }

    /// 移除用户的句柄和全部订阅，重复调用是安全的
    pub async fn unregister(&self, user_id: &UserId) {
        let mut state = self.state.write().await;
        if state.remove_connection(user_id) {
            tracing::debug!(user_id = %user_id, "connection unregistered");
        }
    }

    /// 仅当 `connection_id` 仍是该用户的当前连接时才注销。
    ///
    /// 返回是否真的移除了连接。
    pub async fn release(&self, user_id: &UserId, connection_id: ConnectionId) -> bool {
        let mut state = self.state.write().await;
        let is_current = state
            .connections
            .get(user_id)
            .is_some_and(|conn| conn.id == connection_id);
        if !is_current {
            tracing::debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "stale connection released"
            );
            return false;
        }
        state.remove_connection(user_id);
        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "connection released");
        true
    }

    /// 订阅聊天。用户没有在线连接时静默忽略；不检查聊天是否存在或成员关系。
    pub async fn subscribe(&self, user_id: &UserId, chat_id: &ChatId) {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(user_id) {
            tracing::debug!(user_id = %user_id, chat_id = %chat_id, "subscribe ignored, not registered");
            return;
        }
        state
            .subscribers
            .entry(chat_id.clone())
            .or_default()
            .insert(user_id.clone());
        state
            .subscriptions
            .entry(user_id.clone())
            .or_default()
            .insert(chat_id.clone());
    }

    pub async fn unsubscribe(&self, user_id: &UserId, chat_id: &ChatId) {
        let mut state = self.state.write().await;
        if let Some(users) = state.subscribers.get_mut(chat_id) {
            users.remove(user_id);
            if users.is_empty() {
                state.subscribers.remove(chat_id);
            }
        }
        if let Some(chats) = state.subscriptions.get_mut(user_id) {
            chats.remove(chat_id);
            if chats.is_empty() {
                state.subscriptions.remove(user_id);
            }
        }
    }

    /// 把消息投递给 `message.chat_id` 的所有订阅者。
    ///
    /// 单个句柄失败只记日志，不影响其他订阅者，也不会移除该句柄。
    pub async fn broadcast(&self, message: &Message) -> BroadcastReport {
        let targets: Vec<(UserId, Arc<dyn ConnectionHandle>)> = {
            let state = self.state.read().await;
            match state.subscribers.get(&message.chat_id) {
                Some(users) => users
                    .iter()
                    .filter_map(|user_id| {
                        state
                            .connections
                            .get(user_id)
                            .map(|conn| (user_id.clone(), conn.handle.clone()))
                    })
                    .collect(),
                None => Vec::new(),
            }
        };

        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let results = join_all(targets.iter().map(|(_, handle)| handle.deliver(message))).await;

        let mut report = BroadcastReport::default();
        for ((user_id, _), result) in targets.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        user_id = %user_id,
                        chat_id = %message.chat_id,
                        message_id = %message.id,
                        error = %err,
                        "delivery failed"
                    );
                }
            }
        }
        report
    }

    /// 当前订阅某聊天的用户，按 id 排序
    pub async fn subscribers(&self, chat_id: &ChatId) -> Vec<UserId> {
        let state = self.state.read().await;
        let mut users: Vec<UserId> = state
            .subscribers
            .get(chat_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    pub async fn is_registered(&self, user_id: &UserId) -> bool {
        self.state.read().await.connections.contains_key(user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    #[cfg(test)]
    async fn subscribed_chat_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }
}
