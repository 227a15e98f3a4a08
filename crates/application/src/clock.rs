use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{TimeZone, Utc};
use domain::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// 系统时钟。
///
/// 进程内单调：墙上时间回拨时返回上一次的值加 1ns，保证后创建的消息时间戳不早于先创建的。
#[derive(Debug, Default)]
pub struct SystemClock {
    last_nanos: AtomicI64,
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let mut previous = self.last_nanos.load(Ordering::Acquire);
        loop {
            let next = if wall > previous {
                wall
            } else {
                previous.saturating_add(1)
            };
            match self.last_nanos.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Utc.timestamp_nanos(next),
                Err(actual) => previous = actual,
            }
        }
    }
}
