//! 回环网络上的多域测试夹具。

#![allow(dead_code)]

use std::sync::Arc;

use sheetfed_core::config::FederationConfig;
use sheetfed_core::{CellId, ServiceEndpoint, ServiceName, Spreadsheet, User};
use sheetfed_discovery::Announcement;
use sheetfed_federation::{
    Connector, FederationContext, LoopbackConnector, LoopbackNetwork, SpreadsheetsResource,
    UsersResource,
};

pub const PASSWORD: &str = "secret";

/// 重试间隔压到 1 ms、两次尝试；刷新周期足够长，测试通过 `refresh()` 显式触发刷新。
pub fn fast_config(domain: &str) -> FederationConfig {
    let mut config = FederationConfig::for_domain(domain);
    config.retry.max_attempts = 2;
    config.retry.interval_ms = 1;
    config.cache.refresh_period_ms = 3_600_000;
    config
}

/// 一个域：Users 与 Spreadsheets 各自运行在独立的“进程”（上下文）中。
pub struct TestDomain {
    pub name: String,
    pub users_uri: String,
    pub sheets_uri: String,
    pub users_context: FederationContext,
    pub sheets_context: FederationContext,
    pub users: Arc<UsersResource>,
    pub sheets: Arc<SpreadsheetsResource>,
}

pub fn spawn_domain(network: &Arc<LoopbackNetwork>, name: &str) -> TestDomain {
    let users_uri = format!("loop://{name}/users/rest");
    let sheets_uri = format!("loop://{name}/sheets/soap");
    let connector: Arc<dyn Connector> = Arc::new(LoopbackConnector::new(Arc::clone(network)));

    let users_context = FederationContext::new(
        fast_config(name),
        ServiceEndpoint::new(name, ServiceName::Users, users_uri.clone()),
        Arc::clone(&connector),
    );
    let sheets_context = FederationContext::new(
        fast_config(name),
        ServiceEndpoint::new(name, ServiceName::Spreadsheets, sheets_uri.clone()),
        connector,
    );

    let users = Arc::new(UsersResource::new(users_context.clone()));
    network.host_users(users_uri.clone(), users.clone());
    let sheets = SpreadsheetsResource::new(sheets_context.clone());
    network.host_spreadsheets(sheets_uri.clone(), sheets.clone());

    TestDomain {
        name: name.to_owned(),
        users_uri,
        sheets_uri,
        users_context,
        sheets_context,
        users,
        sheets,
    }
}

impl TestDomain {
    pub fn endpoints(&self) -> [ServiceEndpoint; 2] {
        [
            ServiceEndpoint::new(self.name.clone(), ServiceName::Users, self.users_uri.clone()),
            ServiceEndpoint::new(
                self.name.clone(),
                ServiceName::Spreadsheets,
                self.sheets_uri.clone(),
            ),
        ]
    }

    pub fn contexts(&self) -> [&FederationContext; 2] {
        [&self.users_context, &self.sheets_context]
    }

    pub fn set_reachable(&self, network: &LoopbackNetwork, reachable: bool) {
        network.set_reachable(&self.users_uri, reachable);
        network.set_reachable(&self.sheets_uri, reachable);
    }

    pub async fn shutdown(&self) {
        for context in self.contexts() {
            context.shutdown().await;
        }
    }
}

/// 让每个上下文都收到所有域的公告（自身公告由发现引擎过滤）。
pub fn link(domains: &[&TestDomain]) {
    for domain in domains {
        for context in domain.contexts() {
            for other in domains {
                for endpoint in other.endpoints() {
                    context
                        .discovery()
                        .observe(&Announcement::from(&endpoint).encode());
                }
            }
        }
    }
}

pub fn user(id: &str, full_name: &str) -> User {
    User::new(id, full_name, format!("{id}@example.org"), PASSWORD)
}

pub fn cell(id: &str) -> CellId {
    id.parse().expect("valid cell id")
}

pub fn sheet(owner: &str, rows: usize, columns: usize, cells: &[(&str, &str)]) -> Spreadsheet {
    cells
        .iter()
        .fold(Spreadsheet::draft(owner, rows, columns), |sheet, (id, raw)| {
            sheet.with_cell(cell(id), *raw)
        })
}
