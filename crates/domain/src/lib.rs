//! 聊天系统核心领域模型
//!
//! 包含用户、聊天、消息三个实体，以及约束它们的校验规则和错误分类。
//! 这里没有任何 I/O，持久化与广播都在应用层之外完成。

pub mod chat;
pub mod errors;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use chat::{Chat, MIN_CHAT_MEMBERS};
pub use errors::{DomainError, ErrorKind, RepositoryError};
pub use message::Message;
pub use user::User;
pub use value_objects::{ChatId, MessageId, Timestamp, UserId, UserName, MAX_ID_LEN};
