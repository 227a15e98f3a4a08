//! 主应用程序入口
//!
//! 加载配置、选择存储后端、组装服务并启动 Axum Web API。

use std::{sync::Arc, time::Duration};

use application::{
    ChatService, ChatServiceDependencies, ConnectionRegistry, RandomMessageIdGenerator,
    SessionOrchestrator, SystemClock,
};
use config::AppConfig;
use infrastructure::Storage;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // RUST_LOG 优先于配置文件
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(config = %config.sanitize(), "configuration loaded");

    let storage = Storage::from_config(&config.storage).await?;

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        user_repository: storage.users.clone(),
        chat_repository: storage.chats.clone(),
        message_repository: storage.messages.clone(),
        clock: Arc::new(SystemClock::default()),
        id_generator: Arc::new(RandomMessageIdGenerator::default()),
        storage_timeout: Duration::from_millis(config.storage.timeout_ms),
    }));
    let sessions = Arc::new(SessionOrchestrator::new(
        chat_service,
        Arc::new(ConnectionRegistry::new()),
    ));

    let app = router(AppState::new(sessions));
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "chat server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.close().await;
    tracing::info!("chat server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        // 无法监听信号时保持运行
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
