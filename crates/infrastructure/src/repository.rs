use std::sync::Arc;

use application::{ChatRepository, MessageRepository, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Chat, ChatId, Message, MessageId, RepositoryError, User, UserId, UserName,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

const UNIQUE_VIOLATION: &str = "23505";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return RepositoryError::Conflict;
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: String,
    name: String,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let name = UserName::parse(value.name).map_err(|err| invalid_data(err.to_string()))?;
        Ok(User::new(UserId::new_unchecked(value.id), name))
    }
}

#[derive(Debug, FromRow)]
struct ChatRecord {
    id: String,
    members: Vec<String>,
}

impl From<ChatRecord> for Chat {
    fn from(value: ChatRecord) -> Self {
        // 写入前已经校验过成员数量和重复
        Chat {
            id: ChatId::new_unchecked(value.id),
            members: value
                .members
                .into_iter()
                .map(UserId::new_unchecked)
                .collect(),
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: String,
    from_user: String,
    chat_id: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(value: MessageRecord) -> Self {
        Message::new(
            MessageId::new_unchecked(value.id),
            UserId::new_unchecked(value.from_user),
            ChatId::new_unchecked(value.chat_id),
            value.text,
            value.created_at,
        )
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, name)
            VALUES ($1, $2)
            RETURNING id, name
            "#,
        )
        .bind(user.id.as_str())
        .bind(user.name.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let record =
            sqlx::query_as::<_, UserRecord>(r#"SELECT id, name FROM users WHERE id = $1"#)
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create(&self, chat: Chat) -> Result<Chat, RepositoryError> {
        let members: Vec<&str> = chat.members.iter().map(UserId::as_str).collect();
        let record = sqlx::query_as::<_, ChatRecord>(
            r#"
            INSERT INTO chats (id, members)
            VALUES ($1, $2)
            RETURNING id, members
            "#,
        )
        .bind(chat.id.as_str())
        .bind(&members)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(Chat::from(record))
    }

    async fn find_by_id(&self, id: &ChatId) -> Result<Option<Chat>, RepositoryError> {
        let record =
            sqlx::query_as::<_, ChatRecord>(r#"SELECT id, members FROM chats WHERE id = $1"#)
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(record.map(Chat::from))
    }

    async fn list_by_member(&self, user_id: &UserId) -> Result<Vec<Chat>, RepositoryError> {
        let records = sqlx::query_as::<_, ChatRecord>(
            r#"SELECT id, members FROM chats WHERE $1 = ANY(members) ORDER BY id"#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Chat::from).collect())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, from_user, chat_id, text, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, from_user, chat_id, text, created_at
            "#,
        )
        .bind(message.id.as_str())
        .bind(message.from.as_str())
        .bind(message.chat_id.as_str())
        .bind(&message.text)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(Message::from(record))
    }

    async fn list_by_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, from_user, chat_id, text, created_at
            FROM messages
            WHERE chat_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(chat_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Message::from).collect())
    }
}

/// 共享同一个连接池的三个仓储
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub chat_repository: Arc<PgChatRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            chat_repository: Arc::new(PgChatRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
