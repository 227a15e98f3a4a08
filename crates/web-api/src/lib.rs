//! Web API 层。
//!
//! 提供 Axum 路由：REST 管理接口委托给 `ChatService`，`/ws` 为每条连接驱动一个 `Session`。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
