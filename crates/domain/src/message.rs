use crate::value_objects::{ChatId, MessageId, Timestamp, UserId};

/// 已持久化的聊天消息。
///
/// 消息只创建一次，之后不可变；同一聊天内按 `created_at` 排序。
/// 正文不做非空校验，空消息是合法的。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: UserId,
    pub chat_id: ChatId,
    pub text: String,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        from: UserId,
        chat_id: ChatId,
        text: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            from,
            chat_id,
            text: text.into(),
            created_at,
        }
    }
}
