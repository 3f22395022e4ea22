//! 进程级日志安装。
//!
//! # 教案式说明
//! - **意图（Why）**：各 crate 只通过 `tracing` 宏输出结构化字段（`domain`、`service`、`uri`、
//!   `attempt`），由宿主进程在启动时安装一次订阅器；
//! - **契约（What）**：重复调用返回 [`InstallError::AlreadyInstalled`]；外部已设置全局订阅器时返回
//!   [`InstallError::SubscriberAlreadySet`]；过滤规则取自 `RUST_LOG`，缺省为 `info`；
//! - **执行（How）**：`tracing-subscriber` 的 `registry + EnvFilter + fmt` 组合。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("logging is already installed")]
    AlreadyInstalled,
    #[error("another global tracing subscriber is already set")]
    SubscriberAlreadySet,
    #[error("cannot set the global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn install() -> Result<(), InstallError> {
    if INSTALLED.get().is_some() {
        return Err(InstallError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(InstallError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    INSTALLED
        .set(())
        .map_err(|_| InstallError::AlreadyInstalled)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
