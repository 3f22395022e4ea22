use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sheetfed_core::{
    ServiceError, ServiceName, ServiceResult, SpreadsheetsService, User, UserPatch, UsersService,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::context::FederationContext;

/// 一个域的 Users 服务端资源。
///
/// # 教案式说明
/// - **意图 (Why)**：用户是凭据的唯一来源，本域与其它域的 Spreadsheets 资源都经由它校验密码；
/// - **契约 (What)**：
///   - 所有变更在 `write_gate` 内串行执行；实体表的读写锁从不跨越 `.await`；
///   - 删除用户时，若本域的 Spreadsheets 端点已知，先删除该用户的全部表格，失败则整个删除失败；
/// - **执行 (How)**：读路径只取实体表读锁，因此校验请求不会被正在级联删除的写路径阻塞。
pub struct UsersResource {
    context: FederationContext,
    users: RwLock<HashMap<String, User>>,
    write_gate: Mutex<()>,
}

impl UsersResource {
    pub fn new(context: FederationContext) -> Self {
        Self {
            context,
            users: RwLock::new(HashMap::new()),
            write_gate: Mutex::new(()),
        }
    }

    pub fn domain(&self) -> &str {
        self.context.domain()
    }

    /// 校验凭据并返回实体快照。
    fn authenticate(&self, user_id: &str, password: &str) -> ServiceResult<User> {
        let user = self
            .users
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("user `{user_id}` does not exist")))?;
        if user.password != password {
            return Err(ServiceError::forbidden(format!(
                "wrong password for user `{user_id}`"
            )));
        }
        Ok(user)
    }
}

#[async_trait]
impl UsersService for UsersResource {
    async fn create_user(&self, user: User) -> ServiceResult<String> {
        if !user.is_complete() {
            return Err(ServiceError::bad_request(
                "user id, full name, email and password are all required",
            ));
        }
        let _gate = self.write_gate.lock().await;
        let mut users = self.users.write();
        if users.contains_key(&user.user_id) {
            return Err(ServiceError::conflict(format!(
                "user `{}` already exists",
                user.user_id
            )));
        }
        let user_id = user.user_id.clone();
        users.insert(user_id.clone(), user);
        info!(domain = %self.domain(), user_id = %user_id, "user created");
        Ok(user_id)
    }

    async fn verify_user(&self, user_id: &str, password: &str) -> ServiceResult<bool> {
        let users = self.users.read();
        let user = users
            .get(user_id)
            .ok_or_else(|| ServiceError::not_found(format!("user `{user_id}` does not exist")))?;
        Ok(user.password == password)
    }

    async fn get_user(&self, user_id: &str, password: &str) -> ServiceResult<User> {
        self.authenticate(user_id, password)
    }

    async fn update_user(
        &self,
        user_id: &str,
        password: &str,
        patch: UserPatch,
    ) -> ServiceResult<User> {
        if [&patch.full_name, &patch.email, &patch.password]
            .into_iter()
            .flatten()
            .any(String::is_empty)
        {
            return Err(ServiceError::bad_request("patched fields must not be empty"));
        }
        let _gate = self.write_gate.lock().await;
        let updated = self.authenticate(user_id, password)?.patched(&patch);
        self.users
            .write()
            .insert(user_id.to_owned(), updated.clone());
        Ok(updated)
    }

    async fn delete_user(&self, user_id: &str, password: &str) -> ServiceResult<User> {
        let _gate = self.write_gate.lock().await;
        self.authenticate(user_id, password)?;

        let domain = self.domain().to_owned();
        if self.context.has_endpoint(&domain, ServiceName::Spreadsheets) {
            self.context
                .spreadsheets_client(&domain)?
                .delete_user_spreadsheets(user_id, password)
                .await?;
        }

        let removed = self
            .users
            .write()
            .remove(user_id)
            .ok_or_else(|| ServiceError::not_found(format!("user `{user_id}` does not exist")))?;
        info!(domain = %domain, user_id, "user deleted");
        Ok(removed)
    }

    async fn search_users(&self, pattern: &str) -> ServiceResult<Vec<User>> {
        let mut found: Vec<User> = self
            .users
            .read()
            .values()
            .filter(|user| user.matches(pattern))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(found)
    }
}
