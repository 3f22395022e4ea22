use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// `Sleep` 为时钟接口返回的统一延迟 Future 类型。
///
/// # 设计意图（Why）
/// - 以 `Pin<Box<dyn Future>>` 表达异步睡眠原语，`Clock` 因此保持对象安全，可以
///   `Arc<dyn Clock>` 的形式注入重试层。
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// 可注入的等待能力。
///
/// # 接口约束（What）
/// - `sleep` 返回一个在给定持续时间后完成的 Future；
/// - 重试层只通过该 trait 等待，测试因此可以观察每一次退避而不真正睡眠。
pub trait Clock: Send + Sync + 'static {
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// 生产实现，委托给 Tokio 计时器。
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// 记录型时钟：立即完成每次睡眠，并按顺序记录请求的时长。
///
/// # 教案式说明
/// - **意图 (Why)**：重试测试需要断言“逻辑错误零等待”“传输错误每次等待固定间隔”，
///   又不能让 CI 真的睡眠数秒；
/// - **契约 (What)**：`sleeps()` 返回迄今为止所有 `sleep` 调用的时长快照；克隆共享同一记录。
#[derive(Clone, Debug, Default)]
pub struct RecordingClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) -> Sleep {
        if let Ok(mut guard) = self.sleeps.lock() {
            guard.push(duration);
        }
        Box::pin(std::future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_clock_completes_immediately() {
        let clock = RecordingClock::new();
        let shared = clock.clone();
        clock.sleep(Duration::from_secs(3600)).await;
        clock.sleep(Duration::from_millis(5)).await;
        assert_eq!(
            shared.sleeps(),
            vec![Duration::from_secs(3600), Duration::from_millis(5)]
        );
    }
}
