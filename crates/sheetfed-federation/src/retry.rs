//! 重试装饰器。
//!
//! # 教案式说明
//! - **意图 (Why)**：远端域随时可能短暂不可达；在调用方看到失败之前，先以固定节律重试传输层
//!   失败，而逻辑错误（格式良好的错误响应）重试也不会改变结果，必须立即透传；
//! - **契约 (What)**：
//!   - 单次尝试的超时由传输层按 `TransportConfig` 施加，超时以传输失败的形式到达这里；
//!   - 传输失败后等待 `interval` 再试，总尝试次数不超过 `max_attempts`；最后一次失败后不再
//!     等待，直接返回 [`ErrorKind::Unavailable`](sheetfed_core::ErrorKind::Unavailable)；
//!   - 逻辑错误原样返回：一次尝试、零等待；
//! - **执行 (How)**：[`RetryPolicy::run`] 接收零参闭包，每次尝试重新调用闭包构造 Future；
//!   等待通过注入的 [`Clock`] 完成，测试可用 `RecordingClock` 观测每一次退避。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sheetfed_core::config::FederationConfig;
use sheetfed_core::{
    CallError, Clock, Grid, ServiceError, ServiceResult, Spreadsheet, SpreadsheetsService,
    SpreadsheetsTransport, User, UserPatch, UsersService, UsersTransport,
};
use tracing::{debug, warn};

/// 重试节律：尝试次数与间隔。
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            clock,
        }
    }

    pub fn from_config(config: &FederationConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.retry.max_attempts, config.retry.interval(), clock)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 执行一次带重试的调用。
    ///
    /// `endpoint` 与 `operation` 只用于日志与错误描述。
    pub async fn run<T, F, Fut>(&self, endpoint: &str, operation: &str, mut call: F) -> ServiceResult<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, CallError>> + Send,
    {
        let mut attempt = 1;
        loop {
            let transport = match call().await {
                Ok(value) => return Ok(value),
                Err(CallError::Service(err)) => return Err(err),
                Err(CallError::Transport(err)) => err,
            };

            if attempt >= self.max_attempts {
                warn!(
                    uri = %endpoint,
                    operation,
                    attempt,
                    error = %transport,
                    "giving up after transport failures"
                );
                return Err(ServiceError::unavailable(format!(
                    "{operation} on `{endpoint}` failed after {attempt} attempts: {transport}"
                )));
            }
            debug!(
                uri = %endpoint,
                operation,
                attempt,
                error = %transport,
                "transport failure, retrying"
            );
            self.clock.sleep(self.interval).await;
            attempt += 1;
        }
    }
}

/// Users 原始传输客户端之上的重试装饰器。
pub struct RetryUsersClient {
    uri: String,
    inner: Arc<dyn UsersTransport>,
    policy: RetryPolicy,
}

impl RetryUsersClient {
    pub fn new(uri: impl Into<String>, inner: Arc<dyn UsersTransport>, policy: RetryPolicy) -> Self {
        Self {
            uri: uri.into(),
            inner,
            policy,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl UsersService for RetryUsersClient {
    async fn create_user(&self, user: User) -> ServiceResult<String> {
        self.policy
            .run(&self.uri, "create_user", || self.inner.create_user(user.clone()))
            .await
    }

    async fn verify_user(&self, user_id: &str, password: &str) -> ServiceResult<bool> {
        self.policy
            .run(&self.uri, "verify_user", || self.inner.verify_user(user_id, password))
            .await
    }

    async fn get_user(&self, user_id: &str, password: &str) -> ServiceResult<User> {
        self.policy
            .run(&self.uri, "get_user", || self.inner.get_user(user_id, password))
            .await
    }

    async fn update_user(
        &self,
        user_id: &str,
        password: &str,
        patch: UserPatch,
    ) -> ServiceResult<User> {
        self.policy
            .run(&self.uri, "update_user", || {
                self.inner.update_user(user_id, password, patch.clone())
            })
            .await
    }

    async fn delete_user(&self, user_id: &str, password: &str) -> ServiceResult<User> {
        self.policy
            .run(&self.uri, "delete_user", || self.inner.delete_user(user_id, password))
            .await
    }

    async fn search_users(&self, pattern: &str) -> ServiceResult<Vec<User>> {
        self.policy
            .run(&self.uri, "search_users", || self.inner.search_users(pattern))
            .await
    }
}

/// Spreadsheets 原始传输客户端之上的重试装饰器。
pub struct RetrySpreadsheetsClient {
    uri: String,
    inner: Arc<dyn SpreadsheetsTransport>,
    policy: RetryPolicy,
}

impl RetrySpreadsheetsClient {
    pub fn new(
        uri: impl Into<String>,
        inner: Arc<dyn SpreadsheetsTransport>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            uri: uri.into(),
            inner,
            policy,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl SpreadsheetsService for RetrySpreadsheetsClient {
    async fn create_spreadsheet(&self, sheet: Spreadsheet, password: &str) -> ServiceResult<String> {
        self.policy
            .run(&self.uri, "create_spreadsheet", || {
                self.inner.create_spreadsheet(sheet.clone(), password)
            })
            .await
    }

    async fn delete_spreadsheet(&self, sheet_id: &str, password: &str) -> ServiceResult<()> {
        self.policy
            .run(&self.uri, "delete_spreadsheet", || {
                self.inner.delete_spreadsheet(sheet_id, password)
            })
            .await
    }

    async fn get_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Spreadsheet> {
        self.policy
            .run(&self.uri, "get_spreadsheet", || {
                self.inner.get_spreadsheet(sheet_id, user_id, password)
            })
            .await
    }

    async fn get_spreadsheet_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Grid> {
        self.policy
            .run(&self.uri, "get_spreadsheet_values", || {
                self.inner.get_spreadsheet_values(sheet_id, user_id, password)
            })
            .await
    }

    async fn get_referenced_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        range: &str,
    ) -> ServiceResult<Grid> {
        self.policy
            .run(&self.uri, "get_referenced_values", || {
                self.inner.get_referenced_values(sheet_id, user_id, range)
            })
            .await
    }

    async fn update_cell(
        &self,
        sheet_id: &str,
        cell: &str,
        raw_value: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        self.policy
            .run(&self.uri, "update_cell", || {
                self.inner
                    .update_cell(sheet_id, cell, raw_value, user_id, password)
            })
            .await
    }

    async fn share_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        self.policy
            .run(&self.uri, "share_spreadsheet", || {
                self.inner.share_spreadsheet(sheet_id, user_id, password)
            })
            .await
    }

    async fn unshare_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        self.policy
            .run(&self.uri, "unshare_spreadsheet", || {
                self.inner.unshare_spreadsheet(sheet_id, user_id, password)
            })
            .await
    }

    async fn delete_user_spreadsheets(&self, user_id: &str, password: &str) -> ServiceResult<()> {
        self.policy
            .run(&self.uri, "delete_user_spreadsheets", || {
                self.inner.delete_user_spreadsheets(user_id, password)
            })
            .await
    }

    async fn list_spreadsheets(&self) -> ServiceResult<Vec<Spreadsheet>> {
        self.policy
            .run(&self.uri, "list_spreadsheets", || self.inner.list_spreadsheets())
            .await
    }
}
