//! 协议无关的能力契约。
//!
//! # 教案式说明
//! - **意图 (Why)**：资源、重试层、缓存层与两种线上绑定都只依赖这里的 trait，核心逻辑不感知
//!   具体编码；
//! - **契约 (What)**：
//!   - [`UsersService`]/[`SpreadsheetsService`] 是服务端资源与客户端装饰器共同实现的契约，
//!     失败统一为 [`ServiceError`]；
//!   - [`UsersTransport`]/[`SpreadsheetsTransport`] 是原始绑定客户端的契约，失败为
//!     [`CallError`]，保留“传输失败”与“逻辑失败”的区分，供重试层分类；
//! - **执行 (How)**：全部采用 `async_trait`，以 `Arc<dyn ...>` 形式在上下文与资源之间共享。

use async_trait::async_trait;

use crate::cell::Grid;
use crate::error::{CallError, ServiceResult};
use crate::model::{Spreadsheet, User, UserPatch};

#[async_trait]
pub trait UsersService: Send + Sync + 'static {
    /// 返回新用户的 id。
    async fn create_user(&self, user: User) -> ServiceResult<String>;

    /// 用户不存在返回 `NotFound`；密码不符返回 `Ok(false)`。
    async fn verify_user(&self, user_id: &str, password: &str) -> ServiceResult<bool>;

    async fn get_user(&self, user_id: &str, password: &str) -> ServiceResult<User>;

    async fn update_user(
        &self,
        user_id: &str,
        password: &str,
        patch: UserPatch,
    ) -> ServiceResult<User>;

    async fn delete_user(&self, user_id: &str, password: &str) -> ServiceResult<User>;

    /// 全名大小写不敏感子串匹配；空模式返回全部用户。
    async fn search_users(&self, pattern: &str) -> ServiceResult<Vec<User>>;
}

#[async_trait]
pub trait SpreadsheetsService: Send + Sync + 'static {
    /// 返回新表格的 id；`sheet_id` 与 `domain` 由接收方分配。
    async fn create_spreadsheet(&self, sheet: Spreadsheet, password: &str) -> ServiceResult<String>;

    async fn delete_spreadsheet(&self, sheet_id: &str, password: &str) -> ServiceResult<()>;

    async fn get_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Spreadsheet>;

    async fn get_spreadsheet_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Grid>;

    /// 跨域引用入口：`user_id` 为 `user@domain` 形式，`range` 形如 `A1:B3`。
    async fn get_referenced_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        range: &str,
    ) -> ServiceResult<Grid>;

    async fn update_cell(
        &self,
        sheet_id: &str,
        cell: &str,
        raw_value: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()>;

    async fn share_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()>;

    async fn unshare_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()>;

    async fn delete_user_spreadsheets(&self, user_id: &str, password: &str) -> ServiceResult<()>;

    /// 全量列出本域持有的表格，供远端缓存刷新使用。
    async fn list_spreadsheets(&self) -> ServiceResult<Vec<Spreadsheet>>;
}

/// 原始绑定客户端（Users）。每次调用对应一次线上往返。
#[async_trait]
pub trait UsersTransport: Send + Sync + 'static {
    async fn create_user(&self, user: User) -> Result<String, CallError>;

    async fn verify_user(&self, user_id: &str, password: &str) -> Result<bool, CallError>;

    async fn get_user(&self, user_id: &str, password: &str) -> Result<User, CallError>;

    async fn update_user(
        &self,
        user_id: &str,
        password: &str,
        patch: UserPatch,
    ) -> Result<User, CallError>;

    async fn delete_user(&self, user_id: &str, password: &str) -> Result<User, CallError>;

    async fn search_users(&self, pattern: &str) -> Result<Vec<User>, CallError>;
}

/// 原始绑定客户端（Spreadsheets）。
#[async_trait]
pub trait SpreadsheetsTransport: Send + Sync + 'static {
    async fn create_spreadsheet(
        &self,
        sheet: Spreadsheet,
        password: &str,
    ) -> Result<String, CallError>;

    async fn delete_spreadsheet(&self, sheet_id: &str, password: &str) -> Result<(), CallError>;

    async fn get_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> Result<Spreadsheet, CallError>;

    async fn get_spreadsheet_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> Result<Grid, CallError>;

    async fn get_referenced_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        range: &str,
    ) -> Result<Grid, CallError>;

    async fn update_cell(
        &self,
        sheet_id: &str,
        cell: &str,
        raw_value: &str,
        user_id: &str,
        password: &str,
    ) -> Result<(), CallError>;

    async fn share_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> Result<(), CallError>;

    async fn unshare_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> Result<(), CallError>;

    async fn delete_user_spreadsheets(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<(), CallError>;

    async fn list_spreadsheets(&self) -> Result<Vec<Spreadsheet>, CallError>;
}
