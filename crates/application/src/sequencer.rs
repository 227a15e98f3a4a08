use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use domain::ChatId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 按聊天串行化"持久化 + 广播"。
///
/// 同一聊天内，先提交的消息先广播；不同聊天互不等待。
/// 没有人持有或等待的聊天锁在释放时被清理，避免随聊天数增长。
#[derive(Default)]
pub struct ChatSequencer {
    lanes: Mutex<HashMap<ChatId, Arc<AsyncMutex<()>>>>,
}

/// 持有期间独占某个聊天的发送通道
pub struct ChatTurn<'a> {
    sequencer: &'a ChatSequencer,
    chat_id: ChatId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ChatSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enter(&self, chat_id: &ChatId) -> ChatTurn<'_> {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
            lanes.entry(chat_id.clone()).or_default().clone()
        };
        let guard = lane.lock_owned().await;
        ChatTurn {
            sequencer: self,
            chat_id: chat_id.clone(),
            guard: Some(guard),
        }
    }

    /// 当前仍保留的聊天锁数量
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn leave(&self, chat_id: &ChatId, guard: OwnedMutexGuard<()>) {
        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        drop(guard);
        // 只剩映射表自己引用时说明没有等待者
        if let Some(lane) = lanes.get(chat_id) {
            if Arc::strong_count(lane) == 1 {
                lanes.remove(chat_id);
            }
        }
    }
}

impl Drop for ChatTurn<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.sequencer.leave(&self.chat_id, guard);
        }
    }
}
