//! 联邦上下文：一个服务进程内所有跨域协作的入口。
//!
//! # 教案式注解
//! - **架构定位 (Where)**：资源与缓存客户端都只持有 [`FederationContext`]，不再依赖进程级静态
//!   变量；上下文在启动时构造，显式 `start` 与 `shutdown`；
//! - **问题动机 (Why)**：跨域调用需要“端点表 → 原始传输 → 重试 → 缓存”的完整装配，而且每个域
//!   只应装配一次，否则同一个远端会被多个刷新循环重复拉取；
//! - **协作方式 (How)**：
//!   - [`Discovery`] 首次登记某个 `(domain, service)` 时回调上下文，立即装配该域的客户端；
//!   - [`FederationContext::users_client`]/[`FederationContext::spreadsheets_client`] 先查目录，
//!     未命中则查端点表装配，端点未知时立即返回 `Unavailable`；
//!   - 每个缓存客户端的刷新循环登记在上下文中，[`FederationContext::shutdown`] 统一回收。
//!
//! # 契约说明 (What)
//! - 每个域的 Users/Spreadsheets 客户端至多装配一次，之后在进程生命周期内复用；
//! - 目录读取互不阻塞（`DashMap`）；装配在目录分片写锁内完成，不跨越 `.await`。
//!
//! # 风险提示 (Trade-offs)
//! - 后台循环持有 `Weak` 引用，上下文被释放后回调与解析自动失效，不会形成引用环。

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use sheetfed_core::config::FederationConfig;
use sheetfed_core::{
    BackgroundTask, Clock, DomainId, FormulaEngine, Grid, ImportRef, ServiceEndpoint, ServiceError,
    ServiceName, ServiceResult, Spreadsheet, SpreadsheetsService, StandardEngine, SystemClock,
};
use sheetfed_discovery::{Discovery, DiscoveryError, DiscoveryHandle, DiscoveryListener, EndpointRegistry};
use tracing::{info, warn};

use crate::binding::Connector;
use crate::cache::{CachedSpreadsheetsClient, CachedUsersClient};
use crate::imports::ImportResolver;
use crate::retry::{RetryPolicy, RetrySpreadsheetsClient, RetryUsersClient};

/// 进程级联邦上下文，克隆代价为一次引用计数。
#[derive(Clone)]
pub struct FederationContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: FederationConfig,
    discovery: Arc<Discovery>,
    connector: Arc<dyn Connector>,
    engine: Arc<dyn FormulaEngine>,
    retry: RetryPolicy,
    users: DashMap<DomainId, Arc<CachedUsersClient>>,
    spreadsheets: DashMap<DomainId, Arc<CachedSpreadsheetsClient>>,
    local_spreadsheets: Mutex<Option<Weak<dyn SpreadsheetsService>>>,
    refreshers: Mutex<Vec<BackgroundTask>>,
    discovery_handle: Mutex<Option<DiscoveryHandle>>,
    resolver: Arc<dyn ImportResolver>,
}

impl std::fmt::Debug for FederationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationContext")
            .field("local", self.inner.discovery.local())
            .field("users_clients", &self.inner.users.len())
            .field("spreadsheets_clients", &self.inner.spreadsheets.len())
            .finish_non_exhaustive()
    }
}

impl FederationContext {
    /// 使用系统时钟与标准公式引擎构造上下文。
    pub fn new(
        config: FederationConfig,
        local: ServiceEndpoint,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::with_parts(
            config,
            local,
            connector,
            Arc::new(StandardEngine),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        config: FederationConfig,
        local: ServiceEndpoint,
        connector: Arc<dyn Connector>,
        engine: Arc<dyn FormulaEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let discovery = Arc::new(Discovery::new(
            local,
            config.discovery.clone(),
            EndpointRegistry::new(),
        ));
        let retry = RetryPolicy::from_config(&config, clock);
        let inner = Arc::new_cyclic(|weak: &Weak<ContextInner>| ContextInner {
            config,
            discovery,
            connector,
            engine,
            retry,
            users: DashMap::new(),
            spreadsheets: DashMap::new(),
            local_spreadsheets: Mutex::new(None),
            refreshers: Mutex::new(Vec::new()),
            discovery_handle: Mutex::new(None),
            resolver: Arc::new(ContextResolver {
                inner: weak.clone(),
            }),
        });
        inner.discovery.set_listener(Arc::new(ContextListener {
            inner: Arc::downgrade(&inner),
        }));
        Self { inner }
    }

    pub fn domain(&self) -> &str {
        &self.inner.config.domain
    }

    pub fn config(&self) -> &FederationConfig {
        &self.inner.config
    }

    pub fn local(&self) -> &ServiceEndpoint {
        self.inner.discovery.local()
    }

    pub fn discovery(&self) -> &Arc<Discovery> {
        &self.inner.discovery
    }

    pub fn engine(&self) -> &Arc<dyn FormulaEngine> {
        &self.inner.engine
    }

    /// 登记本进程托管的 Spreadsheets 资源，缓存重算时指向本域的引用直接走本地。
    pub fn attach_local_spreadsheets(&self, service: Weak<dyn SpreadsheetsService>) {
        *self.inner.local_spreadsheets.lock() = Some(service);
    }

    /// 绑定组播套接字并启动发现循环；已启动时直接返回。
    pub fn start(&self) -> Result<(), DiscoveryError> {
        let mut slot = self.inner.discovery_handle.lock();
        if slot.is_none() {
            *slot = Some(self.inner.discovery.start()?);
        }
        Ok(())
    }

    pub fn has_endpoint(&self, domain: &str, service: ServiceName) -> bool {
        self.inner.discovery.registry().lookup(domain, service).is_some()
    }

    pub fn users_client(&self, domain: &str) -> ServiceResult<Arc<CachedUsersClient>> {
        self.inner.users_client(domain)
    }

    pub fn spreadsheets_client(&self, domain: &str) -> ServiceResult<Arc<CachedSpreadsheetsClient>> {
        self.inner.spreadsheets_client(domain)
    }

    /// 取回另一张表格的区间值，请求方身份为 `sheet` 的所有者。
    pub async fn resolve_import(&self, sheet: &Spreadsheet, import: &ImportRef) -> ServiceResult<Grid> {
        self.inner.resolve_import(sheet, import).await
    }

    /// 停止发现循环与全部缓存刷新循环，并等待它们退出。
    pub async fn shutdown(&self) {
        let handle = self.inner.discovery_handle.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        let refreshers: Vec<BackgroundTask> = std::mem::take(&mut *self.inner.refreshers.lock());
        for task in refreshers {
            task.shutdown().await;
        }
        info!(domain = %self.domain(), "federation context stopped");
    }
}

impl ContextInner {
    fn lookup(&self, domain: &str, service: ServiceName) -> ServiceResult<ServiceEndpoint> {
        self.discovery
            .registry()
            .lookup(domain, service)
            .ok_or_else(|| {
                ServiceError::unavailable(format!(
                    "no {service} endpoint known for domain `{domain}`"
                ))
            })
    }

    fn users_client(&self, domain: &str) -> ServiceResult<Arc<CachedUsersClient>> {
        if let Some(client) = self.users.get(domain) {
            return Ok(Arc::clone(client.value()));
        }
        let endpoint = self.lookup(domain, ServiceName::Users)?;
        self.build_users(&endpoint)
    }

    fn spreadsheets_client(&self, domain: &str) -> ServiceResult<Arc<CachedSpreadsheetsClient>> {
        if let Some(client) = self.spreadsheets.get(domain) {
            return Ok(Arc::clone(client.value()));
        }
        let endpoint = self.lookup(domain, ServiceName::Spreadsheets)?;
        self.build_spreadsheets(&endpoint)
    }

    fn build_users(&self, endpoint: &ServiceEndpoint) -> ServiceResult<Arc<CachedUsersClient>> {
        match self.users.entry(endpoint.domain.clone()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                let transport = self.connector.users(endpoint, &self.config.transport)?;
                let retrying =
                    RetryUsersClient::new(endpoint.uri.clone(), transport, self.retry.clone());
                let client = Arc::new(CachedUsersClient::new(
                    endpoint.domain.clone(),
                    Arc::new(retrying),
                ));
                self.refreshers
                    .lock()
                    .push(client.start_refresh(self.config.cache.refresh_period()));
                info!(domain = %endpoint.domain, uri = %endpoint.uri, "users client ready");
                Ok(Arc::clone(slot.insert(client).value()))
            }
        }
    }

    fn build_spreadsheets(
        &self,
        endpoint: &ServiceEndpoint,
    ) -> ServiceResult<Arc<CachedSpreadsheetsClient>> {
        match self.spreadsheets.entry(endpoint.domain.clone()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                let transport = self.connector.spreadsheets(endpoint, &self.config.transport)?;
                let retrying = RetrySpreadsheetsClient::new(
                    endpoint.uri.clone(),
                    transport,
                    self.retry.clone(),
                );
                let client = Arc::new(CachedSpreadsheetsClient::new(
                    endpoint.domain.clone(),
                    Arc::new(retrying),
                    Arc::clone(&self.engine),
                    Arc::clone(&self.resolver),
                ));
                self.refreshers
                    .lock()
                    .push(client.start_refresh(self.config.cache.refresh_period()));
                info!(domain = %endpoint.domain, uri = %endpoint.uri, "spreadsheets client ready");
                Ok(Arc::clone(slot.insert(client).value()))
            }
        }
    }

    fn local_spreadsheets(&self) -> Option<Arc<dyn SpreadsheetsService>> {
        self.local_spreadsheets.lock().as_ref().and_then(Weak::upgrade)
    }

    async fn resolve_import(&self, sheet: &Spreadsheet, import: &ImportRef) -> ServiceResult<Grid> {
        let requester = sheet.qualified_owner();
        let range = import.range.to_string();
        let local = (import.domain == self.config.domain)
            .then(|| self.local_spreadsheets())
            .flatten();
        match local {
            Some(service) => {
                service
                    .get_referenced_values(&import.sheet_id, &requester, &range)
                    .await
            }
            None => {
                self.spreadsheets_client(&import.domain)?
                    .get_referenced_values(&import.sheet_id, &requester, &range)
                    .await
            }
        }
    }
}

/// 发现回调：首次登记即装配客户端。
struct ContextListener {
    inner: Weak<ContextInner>,
}

impl DiscoveryListener for ContextListener {
    fn on_registered(&self, endpoint: &ServiceEndpoint) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let built = match endpoint.service {
            ServiceName::Users => inner.build_users(endpoint).map(|_| ()),
            ServiceName::Spreadsheets => inner.build_spreadsheets(endpoint).map(|_| ()),
        };
        if let Err(err) = built {
            warn!(
                domain = %endpoint.domain,
                service = %endpoint.service,
                uri = %endpoint.uri,
                error = %err,
                "cannot build client for discovered endpoint"
            );
        }
    }
}

/// 缓存客户端重算时使用的引用解析器。
struct ContextResolver {
    inner: Weak<ContextInner>,
}

#[async_trait]
impl ImportResolver for ContextResolver {
    async fn resolve_import(&self, sheet: &Spreadsheet, import: &ImportRef) -> ServiceResult<Grid> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| ServiceError::unavailable("federation context has been dropped"))?;
        inner.resolve_import(sheet, import).await
    }
}
