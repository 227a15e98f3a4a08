//! 消息 ID 生成策略。
//!
//! 通过 trait 注入，测试可以替换为确定性的实现。

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use domain::MessageId;
use uuid::Uuid;

pub trait MessageIdGenerator: Send + Sync {
    fn next_id(&self) -> MessageId;
}

/// 默认生成器：随机 UUID + 纳秒时间戳 + 进程内计数器。
///
/// 并发发送时即使时间戳相同，随机部分和计数器也能保证不冲突。
#[derive(Debug, Default)]
pub struct RandomMessageIdGenerator {
    counter: AtomicU64,
}

impl MessageIdGenerator for RandomMessageIdGenerator {
    fn next_id(&self) -> MessageId {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        MessageId::new_unchecked(format!(
            "{}-{:x}-{:x}",
            Uuid::new_v4().simple(),
            nanos,
            sequence
        ))
    }
}

/// 确定性生成器，产生 `{prefix}-1`, `{prefix}-2`, …
#[derive(Debug)]
pub struct SequentialMessageIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialMessageIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl MessageIdGenerator for SequentialMessageIdGenerator {
    fn next_id(&self) -> MessageId {
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        MessageId::new_unchecked(format!("{}-{}", self.prefix, next))
    }
}
