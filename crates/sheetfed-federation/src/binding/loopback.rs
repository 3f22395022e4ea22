//! 进程内网络：把端点 URI 解析为本进程中的资源。
//!
//! # 教案式说明
//! - **意图 (Why)**：联邦行为（跨域引用、重试、缓存回退）需要在没有套接字的环境中完整复现，
//!   包括“某个域突然不可达”与“某个域响应缓慢”；
//! - **契约 (What)**：
//!   - [`LoopbackNetwork::host_users`]/[`LoopbackNetwork::host_spreadsheets`] 把资源挂到 URI 上；
//!   - URI 未挂载或被 [`LoopbackNetwork::set_reachable`] 标记为不可达时，每次调用都以
//!     `ConnectionRefused` 失败；
//!   - [`LoopbackNetwork::set_connect_delay`]/[`LoopbackNetwork::set_response_delay`] 模拟慢速
//!     握手与慢速应答，分别受构造时的连接超时与应答超时约束；
//!   - 可达时，结果按 URI 选定的绑定完成一次编码与解码；
//! - **执行 (How)**：挂载表、延迟表与可达性表都是 `DashMap`，查找后立即释放分片锁，再调用资源。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sheetfed_core::config::TransportConfig;
use sheetfed_core::{
    CallError, Grid, ServiceEndpoint, ServiceError, ServiceResult, Spreadsheet,
    SpreadsheetsService, SpreadsheetsTransport, TransportError, User, UserPatch, UsersService,
    UsersTransport,
};

use super::{BindingKind, Connector, within};

#[derive(Default)]
pub struct LoopbackNetwork {
    users: DashMap<String, Arc<dyn UsersService>>,
    spreadsheets: DashMap<String, Arc<dyn SpreadsheetsService>>,
    unreachable: DashSet<String>,
    connect_delays: DashMap<String, Duration>,
    response_delays: DashMap<String, Duration>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn host_users(&self, uri: impl Into<String>, service: Arc<dyn UsersService>) {
        self.users.insert(uri.into(), service);
    }

    pub fn host_spreadsheets(&self, uri: impl Into<String>, service: Arc<dyn SpreadsheetsService>) {
        self.spreadsheets.insert(uri.into(), service);
    }

    pub fn set_reachable(&self, uri: &str, reachable: bool) {
        if reachable {
            self.unreachable.remove(uri);
        } else {
            self.unreachable.insert(uri.to_owned());
        }
    }

    pub fn is_reachable(&self, uri: &str) -> bool {
        !self.unreachable.contains(uri)
    }

    /// 每次建立连接前等待 `delay`；`Duration::ZERO` 取消延迟。
    pub fn set_connect_delay(&self, uri: &str, delay: Duration) {
        set_delay(&self.connect_delays, uri, delay);
    }

    /// 每次应答前等待 `delay`；`Duration::ZERO` 取消延迟。
    pub fn set_response_delay(&self, uri: &str, delay: Duration) {
        set_delay(&self.response_delays, uri, delay);
    }

    fn users_at(&self, uri: &str) -> Result<Arc<dyn UsersService>, CallError> {
        if !self.is_reachable(uri) {
            return Err(refused(uri));
        }
        self.users
            .get(uri)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| refused(uri))
    }

    fn spreadsheets_at(&self, uri: &str) -> Result<Arc<dyn SpreadsheetsService>, CallError> {
        if !self.is_reachable(uri) {
            return Err(refused(uri));
        }
        self.spreadsheets
            .get(uri)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| refused(uri))
    }
}

fn set_delay(delays: &DashMap<String, Duration>, uri: &str, delay: Duration) {
    if delay.is_zero() {
        delays.remove(uri);
    } else {
        delays.insert(uri.to_owned(), delay);
    }
}

async fn pause(delays: &DashMap<String, Duration>, uri: &str) {
    let delay = delays.get(uri).map(|entry| *entry.value());
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn refused(uri: &str) -> CallError {
    TransportError::ConnectionRefused {
        endpoint: uri.to_owned(),
    }
    .into()
}

/// 连接到 [`LoopbackNetwork`] 的 [`Connector`]。
#[derive(Clone)]
pub struct LoopbackConnector {
    network: Arc<LoopbackNetwork>,
}

impl LoopbackConnector {
    pub fn new(network: Arc<LoopbackNetwork>) -> Self {
        Self { network }
    }

    fn link(
        &self,
        endpoint: &ServiceEndpoint,
        transport: &TransportConfig,
    ) -> Result<Link, ServiceError> {
        let binding = BindingKind::of_uri(&endpoint.uri).ok_or_else(|| {
            ServiceError::bad_request(format!(
                "endpoint `{}` names neither a rest nor a soap binding",
                endpoint.uri
            ))
        })?;
        Ok(Link {
            uri: endpoint.uri.clone(),
            binding,
            network: Arc::clone(&self.network),
            connect_timeout: transport.connect_timeout(),
            response_timeout: transport.response_timeout(),
        })
    }
}

impl Connector for LoopbackConnector {
    fn users(
        &self,
        endpoint: &ServiceEndpoint,
        transport: &TransportConfig,
    ) -> Result<Arc<dyn UsersTransport>, ServiceError> {
        Ok(Arc::new(LoopbackUsers(self.link(endpoint, transport)?)))
    }

    fn spreadsheets(
        &self,
        endpoint: &ServiceEndpoint,
        transport: &TransportConfig,
    ) -> Result<Arc<dyn SpreadsheetsTransport>, ServiceError> {
        Ok(Arc::new(LoopbackSpreadsheets(self.link(endpoint, transport)?)))
    }
}

/// 一条到某个 URI 的线路：绑定与两段超时在构造时固定。
struct Link {
    uri: String,
    binding: BindingKind,
    network: Arc<LoopbackNetwork>,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl Link {
    async fn call<S, T, F, Fut>(
        &self,
        resolve: fn(&LoopbackNetwork, &str) -> Result<S, CallError>,
        request: F,
    ) -> Result<T, CallError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let network = self.network.as_ref();
        let service = within(&self.uri, self.connect_timeout, async {
            pause(&network.connect_delays, &self.uri).await;
            resolve(network, &self.uri)
        })
        .await?;
        let result = within(&self.uri, self.response_timeout, async {
            pause(&network.response_delays, &self.uri).await;
            Ok(request(service).await)
        })
        .await?;
        self.binding.round_trip(&self.uri, result)
    }
}

struct LoopbackUsers(Link);

#[async_trait]
impl UsersTransport for LoopbackUsers {
    async fn create_user(&self, user: User) -> Result<String, CallError> {
        self.0
            .call(LoopbackNetwork::users_at, |service| async move {
                service.create_user(user).await
            })
            .await
    }

    async fn verify_user(&self, user_id: &str, password: &str) -> Result<bool, CallError> {
        self.0
            .call(LoopbackNetwork::users_at, |service| async move {
                service.verify_user(user_id, password).await
            })
            .await
    }

    async fn get_user(&self, user_id: &str, password: &str) -> Result<User, CallError> {
        self.0
            .call(LoopbackNetwork::users_at, |service| async move {
                service.get_user(user_id, password).await
            })
            .await
    }

    async fn update_user(
        &self,
        user_id: &str,
        password: &str,
        patch: UserPatch,
    ) -> Result<User, CallError> {
        self.0
            .call(LoopbackNetwork::users_at, |service| async move {
                service.update_user(user_id, password, patch).await
            })
            .await
    }

    async fn delete_user(&self, user_id: &str, password: &str) -> Result<User, CallError> {
        self.0
            .call(LoopbackNetwork::users_at, |service| async move {
                service.delete_user(user_id, password).await
            })
            .await
    }

    async fn search_users(&self, pattern: &str) -> Result<Vec<User>, CallError> {
        self.0
            .call(LoopbackNetwork::users_at, |service| async move {
                service.search_users(pattern).await
            })
            .await
    }
}

struct LoopbackSpreadsheets(Link);

#[async_trait]
impl SpreadsheetsTransport for LoopbackSpreadsheets {
    async fn create_spreadsheet(
        &self,
        sheet: Spreadsheet,
        password: &str,
    ) -> Result<String, CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service.create_spreadsheet(sheet, password).await
            })
            .await
    }

    async fn delete_spreadsheet(&self, sheet_id: &str, password: &str) -> Result<(), CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service.delete_spreadsheet(sheet_id, password).await
            })
            .await
    }

    async fn get_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> Result<Spreadsheet, CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service.get_spreadsheet(sheet_id, user_id, password).await
            })
            .await
    }

    async fn get_spreadsheet_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> Result<Grid, CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service
                    .get_spreadsheet_values(sheet_id, user_id, password)
                    .await
            })
            .await
    }

    async fn get_referenced_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        range: &str,
    ) -> Result<Grid, CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service.get_referenced_values(sheet_id, user_id, range).await
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
    ) -> Result<(), CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service
                    .update_cell(sheet_id, cell, raw_value, user_id, password)
                    .await
            })
            .await
    }

    async fn share_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> Result<(), CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service.share_spreadsheet(sheet_id, user_id, password).await
            })
            .await
    }

    async fn unshare_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> Result<(), CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service.unshare_spreadsheet(sheet_id, user_id, password).await
            })
            .await
    }

    async fn delete_user_spreadsheets(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<(), CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service.delete_user_spreadsheets(user_id, password).await
            })
            .await
    }

    async fn list_spreadsheets(&self) -> Result<Vec<Spreadsheet>, CallError> {
        self.0
            .call(LoopbackNetwork::spreadsheets_at, |service| async move {
                service.list_spreadsheets().await
            })
            .await
    }
}
