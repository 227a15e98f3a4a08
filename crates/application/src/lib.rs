//! 应用层实现。
//!
//! 聊天领域规则（`ChatService`）、在线连接的订阅与广播（`ConnectionRegistry`），
//! 以及把两者串起来的会话编排（`SessionOrchestrator`）。
//! 持久化通过 `repository` 中的端口注入，`memory` 提供内存实现。

pub mod clock;
pub mod error;
pub mod id_generator;
pub mod memory;
pub mod registry;
pub mod repository;
pub mod sequencer;
pub mod services;
pub mod session;

pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use id_generator::{MessageIdGenerator, RandomMessageIdGenerator, SequentialMessageIdGenerator};
pub use memory::{InMemoryChatRepository, InMemoryMessageRepository, InMemoryUserRepository};
pub use registry::{
    BroadcastReport, ConnectionHandle, ConnectionId, ConnectionRegistry, DeliveryError,
};
pub use repository::{ChatRepository, MessageRepository, UserRepository};
pub use sequencer::{ChatSequencer, ChatTurn};
pub use services::{
    ChatService, ChatServiceDependencies, CreateChatRequest, CreateUserRequest,
    SendMessageRequest, DEFAULT_STORAGE_TIMEOUT,
};
pub use session::{InboundEvent, OutboundEvent, Session, SessionOrchestrator};
