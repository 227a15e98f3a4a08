use std::sync::Arc;

use application::{ChatService, SessionOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub sessions: Arc<SessionOrchestrator>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionOrchestrator>) -> Self {
        Self {
            chat_service: sessions.chat_service().clone(),
            sessions,
        }
    }
}
