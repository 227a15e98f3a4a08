//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、嵌入式迁移，以及按配置在内存存储和数据库之间选择的 `Storage`。

pub mod builder;
pub mod migrations;
pub mod repository;

pub use builder::{InfrastructureError, Storage};
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgChatRepository, PgMessageRepository, PgStorage, PgUserRepository,
};
