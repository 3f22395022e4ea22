use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sheetfed_core::{DomainId, ServiceEndpoint, ServiceName};

/// 注册结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Registration {
    /// 首次出现，已记录。
    Added,
    /// 该 `(domain, service)` 已有记录，本次公告被忽略。
    AlreadyKnown,
}

/// `EndpointRegistry` 是进程内的 `(domain, service) → endpoint` 表。
///
/// # 教案式解读
/// - **意图（Why）**：
///   - 收集循环写入、请求处理路径读取，读路径不能被写路径阻塞；
///   - 对外隐藏 `DashMap`，统一“首个公告获胜”的语义，避免调用方误用 `insert` 覆盖旧值。
/// - **契约（What）**：
///   - `register` 只在键不存在时写入，已有记录永不替换，也永不过期；
///   - `lookup` 返回克隆，不暴露内部引用。
/// - **风险提示**：域迁移到新地址后需要重启本进程才能重新发现，这是协议的既有行为。
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    inner: Arc<DashMap<(DomainId, ServiceName), ServiceEndpoint>>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: ServiceEndpoint) -> Registration {
        match self.inner.entry(endpoint.key()) {
            Entry::Occupied(_) => Registration::AlreadyKnown,
            Entry::Vacant(slot) => {
                slot.insert(endpoint);
                Registration::Added
            }
        }
    }

    pub fn lookup(&self, domain: &str, service: ServiceName) -> Option<ServiceEndpoint> {
        self.inner
            .get(&(domain.to_owned(), service))
            .map(|entry| entry.value().clone())
    }

    /// 已知的 URI 列表；每个 `(domain, service)` 至多一个。
    pub fn known_uris_of(&self, domain: &str, service: ServiceName) -> Vec<String> {
        self.lookup(domain, service)
            .map(|endpoint| vec![endpoint.uri])
            .unwrap_or_default()
    }

    /// 全部已知端点的快照，按域名与服务排序。
    pub fn endpoints(&self) -> Vec<ServiceEndpoint> {
        let mut all: Vec<ServiceEndpoint> =
            self.inner.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by(|a, b| a.key().cmp(&b.key()));
        all
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_wins() {
        let registry = EndpointRegistry::new();
        let first = ServiceEndpoint::new("beta", ServiceName::Users, "http://10.0.0.2:8080/rest");
        let second = ServiceEndpoint::new("beta", ServiceName::Users, "http://10.0.0.3:8080/soap");

        assert_eq!(registry.register(first.clone()), Registration::Added);
        assert_eq!(registry.register(second), Registration::AlreadyKnown);
        assert_eq!(registry.lookup("beta", ServiceName::Users), Some(first));
        assert_eq!(
            registry.known_uris_of("beta", ServiceName::Users),
            vec!["http://10.0.0.2:8080/rest".to_owned()]
        );
    }

    #[test]
    fn services_of_one_domain_are_independent() {
        let registry = EndpointRegistry::new();
        registry.register(ServiceEndpoint::new("beta", ServiceName::Users, "u"));
        assert!(registry.known_uris_of("beta", ServiceName::Spreadsheets).is_empty());
        registry.register(ServiceEndpoint::new("beta", ServiceName::Spreadsheets, "s"));
        assert_eq!(registry.len(), 2);
        let services: Vec<ServiceName> = registry.endpoints().iter().map(|e| e.service).collect();
        assert_eq!(services, vec![ServiceName::Users, ServiceName::Spreadsheets]);
    }
}
