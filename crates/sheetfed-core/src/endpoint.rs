use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::DomainId;

/// 可被发现的服务种类。线上名称即公告报文中的 `service` 字段。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ServiceName {
    Users,
    Spreadsheets,
}

impl ServiceName {
    pub const fn as_str(self) -> &'static str {
        match self {
            ServiceName::Users => "users",
            ServiceName::Spreadsheets => "sheets",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("unknown service name `{0}`")]
pub struct UnknownService(pub String);

impl FromStr for ServiceName {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(ServiceName::Users),
            "sheets" => Ok(ServiceName::Spreadsheets),
            other => Err(UnknownService(other.to_owned())),
        }
    }
}

/// `(domain, service) → uri` 联系方式，首次发现后在进程生命周期内不变。
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub domain: DomainId,
    pub service: ServiceName,
    pub uri: String,
}

impl ServiceEndpoint {
    pub fn new(domain: impl Into<DomainId>, service: ServiceName, uri: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service,
            uri: uri.into(),
        }
    }

    pub fn key(&self) -> (DomainId, ServiceName) {
        (self.domain.clone(), self.service)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} @ {}", self.domain, self.service, self.uri)
    }
}
