use std::sync::Arc;

use application::{
    ChatRepository, InMemoryChatRepository, InMemoryMessageRepository, InMemoryUserRepository,
    MessageRepository, UserRepository,
};
use config::{StorageBackend, StorageConfig};
use sqlx::PgPool;
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("database url is not configured")]
    MissingDatabaseUrl,
}

/// 按配置选择的持久化端口集合
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pool: Option<PgPool>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::new()),
            chats: Arc::new(InMemoryChatRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            pool: None,
        }
    }

    /// 连接 PostgreSQL 并执行迁移
    pub async fn postgres(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(database_url, max_connections).await?;
        MIGRATOR.run(&pool).await?;

        let storage = PgStorage::new(pool);
        Ok(Self {
            users: storage.user_repository,
            chats: storage.chat_repository,
            messages: storage.message_repository,
            pool: Some(storage.pool),
        })
    }

    pub async fn from_config(config: &StorageConfig) -> Result<Self, InfrastructureError> {
        match config.backend {
            StorageBackend::Memory => {
                tracing::info!("using in-memory storage");
                Ok(Self::in_memory())
            }
            StorageBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or(InfrastructureError::MissingDatabaseUrl)?;
                let storage = Self::postgres(url, config.max_connections).await?;
                tracing::info!(
                    max_connections = config.max_connections,
                    "connected to postgres storage"
                );
                Ok(storage)
            }
        }
    }

    pub fn backend(&self) -> StorageBackend {
        if self.pool.is_some() {
            StorageBackend::Postgres
        } else {
            StorageBackend::Memory
        }
    }

    /// 关闭数据库连接池，内存存储无操作
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
