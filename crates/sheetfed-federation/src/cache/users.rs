use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sheetfed_core::{
    BackgroundTask, ServiceResult, User, UserPatch, UsersService, spawn_periodic,
};
use tracing::debug;

use super::EntityCache;

/// Users 服务的缓存旁路客户端，装饰一个（通常带重试的）远端客户端。
pub struct CachedUsersClient {
    domain: String,
    inner: Arc<dyn UsersService>,
    cache: Arc<EntityCache<User>>,
}

impl CachedUsersClient {
    pub fn new(domain: impl Into<String>, inner: Arc<dyn UsersService>) -> Self {
        Self {
            domain: domain.into(),
            inner,
            cache: Arc::new(EntityCache::new()),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn cached_users(&self) -> usize {
        self.cache.len()
    }

    /// 拉取一次全量用户并合并进缓存。
    pub async fn refresh(&self) {
        refresh_users(&self.domain, self.inner.as_ref(), &self.cache).await;
    }

    /// 启动周期刷新；返回的任务由调用方负责回收。
    pub fn start_refresh(&self, period: Duration) -> BackgroundTask {
        let domain = self.domain.clone();
        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        spawn_periodic(format!("refresh-users:{domain}"), period, move || {
            let domain = domain.clone();
            let inner = Arc::clone(&inner);
            let cache = Arc::clone(&cache);
            async move { refresh_users(&domain, inner.as_ref(), &cache).await }
        })
    }
}

async fn refresh_users(domain: &str, inner: &dyn UsersService, cache: &EntityCache<User>) {
    match inner.search_users("").await {
        Ok(users) => cache.merge(users, |user| user.user_id.clone()),
        Err(err) => debug!(domain, error = %err, "users cache refresh failed"),
    }
}

#[async_trait]
impl UsersService for CachedUsersClient {
    async fn create_user(&self, user: User) -> ServiceResult<String> {
        self.inner.create_user(user).await
    }

    async fn verify_user(&self, user_id: &str, password: &str) -> ServiceResult<bool> {
        match self.inner.verify_user(user_id, password).await {
            Err(err) if err.is_unavailable() => match self.cache.get(user_id) {
                Some(user) => {
                    debug!(domain = %self.domain, user_id, "verifying against cached user");
                    Ok(user.password == password)
                }
                None => Err(err),
            },
            other => other,
        }
    }

    async fn get_user(&self, user_id: &str, password: &str) -> ServiceResult<User> {
        match self.inner.get_user(user_id, password).await {
            Err(err) if err.is_unavailable() => match self.cache.get(user_id) {
                Some(user) => {
                    debug!(domain = %self.domain, user_id, "serving cached user");
                    Ok(user)
                }
                None => Err(err),
            },
            other => other,
        }
    }

    async fn update_user(
        &self,
        user_id: &str,
        password: &str,
        patch: UserPatch,
    ) -> ServiceResult<User> {
        self.inner.update_user(user_id, password, patch).await
    }

    async fn delete_user(&self, user_id: &str, password: &str) -> ServiceResult<User> {
        self.inner.delete_user(user_id, password).await
    }

    async fn search_users(&self, pattern: &str) -> ServiceResult<Vec<User>> {
        match self.inner.search_users(pattern).await {
            Err(err) if err.is_unavailable() => {
                let mut users = self.cache.filter(|user| user.matches(pattern));
                users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
                Ok(users)
            }
            other => other,
        }
    }
}
