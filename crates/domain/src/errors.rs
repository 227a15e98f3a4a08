//! 领域模型错误定义
//!
//! 定义了聊天系统中所有可能的领域错误与仓储错误，并统一归类到 [`ErrorKind`]，
//! 方便传输层映射为状态码。

use serde::Serialize;
use thiserror::Error;

/// 错误大类，传输层据此区分 NotFound / Forbidden / InvalidArgument / Conflict / Unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidArgument,
    Conflict,
    Unavailable,
}

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("user not found")]
    UserNotFound,

    #[error("chat not found")]
    ChatNotFound,

    /// 发送者或查询者不是聊天成员
    #[error("user is not a member of the chat")]
    UserNotInChat,

    #[error("user {0} already exists")]
    UserAlreadyExists(String),

    #[error("chat {0} already exists")]
    ChatAlreadyExists(String),

    #[error("message {0} already exists")]
    MessageAlreadyExists(String),
}

impl DomainError {
    /// 创建参数错误
    pub fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            DomainError::UserNotFound | DomainError::ChatNotFound => ErrorKind::NotFound,
            DomainError::UserNotInChat => ErrorKind::Forbidden,
            DomainError::UserAlreadyExists(_)
            | DomainError::ChatAlreadyExists(_)
            | DomainError::MessageAlreadyExists(_) => ErrorKind::Conflict,
        }
    }
}

/// 仓储层错误
///
/// 主键冲突必须报告为 `Conflict`，以便服务层映射成领域冲突。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("duplicate key")]
    Conflict,

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::Conflict => ErrorKind::Conflict,
            RepositoryError::Storage { .. } => ErrorKind::Unavailable,
        }
    }
}
