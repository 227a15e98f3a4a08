use domain::{DomainError, ErrorKind, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// 存储调用超时；对调用方表现为可重试的通用服务错误
    #[error("storage unavailable during {operation}")]
    Unavailable { operation: &'static str },
}

impl ApplicationError {
    pub fn unavailable(operation: &'static str) -> Self {
        ApplicationError::Unavailable { operation }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::Domain(err) => err.kind(),
            ApplicationError::Repository(err) => err.kind(),
            ApplicationError::Unavailable { .. } => ErrorKind::Unavailable,
        }
    }

    /// 返回给客户端的错误描述，不暴露存储层细节
    pub fn client_message(&self) -> String {
        match self {
            ApplicationError::Domain(err) => err.to_string(),
            ApplicationError::Repository(RepositoryError::Conflict) => "duplicate key".to_string(),
            ApplicationError::Repository(RepositoryError::Storage { .. })
            | ApplicationError::Unavailable { .. } => "service temporarily unavailable".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_details_are_hidden_from_clients() {
        let err = ApplicationError::from(RepositoryError::storage("password=hunter2"));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(err.client_message(), "service temporarily unavailable");
    }

    #[test]
    fn domain_errors_keep_their_message() {
        let err = ApplicationError::from(DomainError::UserNotInChat);
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.client_message(), "user is not a member of the chat");
    }
}
