//! 可取消、可等待的后台任务。
//!
//! # 教案式说明
//! - **意图 (Why)**：公告发送、公告收集、缓存刷新都是进程级长寿循环；每个循环必须能接收
//!   停止信号并在关闭时被等待完成，测试才能在隔离的运行时中启动与回收它们；
//! - **契约 (What)**：
//!   - [`BackgroundTask::spawn`] 把 [`StopSignal`] 交给任务体，任务体自行在等待点上与信号竞争；
//!   - [`spawn_periodic`] 是固定周期 ticker 的便捷形式；
//!   - [`BackgroundTask::shutdown`] 发出信号并等待任务退出；直接丢弃句柄同样会让任务在下一个
//!     等待点退出（发送端被释放即视为停止）。

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// 停止信号的接收端，可克隆给同一任务内的多个等待点。
#[derive(Clone, Debug)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待停止信号；发送端被释放时同样返回。
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// 运行中的后台任务句柄。
#[derive(Debug)]
pub struct BackgroundTask {
    name: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// 在当前 Tokio 运行时上启动任务。
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (stop, rx) = watch::channel(false);
        let handle = tokio::spawn(body(StopSignal { rx }));
        debug!(task = %name, "background task started");
        Self { name, stop, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 只发信号，不等待。
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// 发信号并等待任务退出。
    pub async fn shutdown(self) {
        self.stop();
        match self.handle.await {
            Ok(()) => debug!(task = %self.name, "background task stopped"),
            Err(err) => warn!(task = %self.name, error = %err, "background task aborted"),
        }
    }
}

/// 按固定周期执行 `tick`，首个周期立即触发；上一轮未完成时顺延而不是补发。
pub fn spawn_periodic<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> BackgroundTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    BackgroundTask::spawn(name, move |mut stop| async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = interval.tick() => tick().await,
            }
        }
    })
}
