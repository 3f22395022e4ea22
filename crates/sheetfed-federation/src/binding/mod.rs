//! 线上绑定。
//!
//! # 教案式说明
//! - **意图 (Why)**：同一个服务可以经 REST 或 SOAP 暴露，调用方只关心能力契约；绑定之间唯一的
//!   差异是“逻辑错误如何穿越线路”（HTTP 状态码 vs. SOAP fault code）与载荷外壳；
//! - **契约 (What)**：
//!   - [`BindingKind::of_uri`] 按端点 URI 的路径后缀（`/rest`、`/soap`）选择绑定；
//!   - [`Connector`] 为端点构造原始传输客户端，失败语义为 [`CallError`]：线路层故障是
//!     `Transport`，远端格式良好的错误应答是 `Service`；
//!   - 构造时传入的 [`TransportConfig`] 决定每次尝试的两段超时：建立连接受 `connect_timeout`
//!     约束，等待应答受 `response_timeout` 约束，任一超时都是 `Transport` 失败；
//!   - 两种绑定解码后得到完全相同的 [`ErrorKind`](sheetfed_core::ErrorKind)；
//! - **执行 (How)**：[`rest`]、[`soap`] 提供成对的 `encode`/`decode`；[`loopback`] 把 URI 解析到
//!   进程内的资源，并让每次调用的结果真实地穿过所选绑定的编解码。

pub mod loopback;
pub mod rest;
pub mod soap;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sheetfed_core::config::TransportConfig;
use sheetfed_core::{
    CallError, ServiceEndpoint, ServiceError, ServiceResult, SpreadsheetsTransport, TransportError,
    UsersTransport,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BindingKind {
    Rest,
    Soap,
}

impl BindingKind {
    /// 按 URI 路径选择绑定；路径既不以 `/rest` 也不以 `/soap` 结尾时返回 `None`。
    pub fn of_uri(uri: &str) -> Option<Self> {
        let path = uri.trim_end_matches('/');
        if path.ends_with("/rest") {
            Some(BindingKind::Rest)
        } else if path.ends_with("/soap") {
            Some(BindingKind::Soap)
        } else {
            None
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            BindingKind::Rest => "rest",
            BindingKind::Soap => "soap",
        }
    }

    /// 让一次调用结果完整地穿过本绑定：服务端编码，客户端解码。
    pub fn round_trip<T>(self, uri: &str, result: ServiceResult<T>) -> Result<T, CallError>
    where
        T: Serialize + DeserializeOwned,
    {
        match self {
            BindingKind::Rest => rest::decode(uri, rest::encode(result)),
            BindingKind::Soap => soap::decode(uri, soap::encode(result)),
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 为已发现的端点构造原始传输客户端。
pub trait Connector: Send + Sync + 'static {
    fn users(
        &self,
        endpoint: &ServiceEndpoint,
        transport: &TransportConfig,
    ) -> Result<Arc<dyn UsersTransport>, ServiceError>;

    fn spreadsheets(
        &self,
        endpoint: &ServiceEndpoint,
        transport: &TransportConfig,
    ) -> Result<Arc<dyn SpreadsheetsTransport>, ServiceError>;
}

/// 在 `limit` 内完成一段线路交互，否则以 `Timeout` 传输失败结束。
pub(crate) async fn within<T>(
    uri: &str,
    limit: Duration,
    exchange: impl Future<Output = Result<T, CallError>>,
) -> Result<T, CallError> {
    match tokio::time::timeout(limit, exchange).await {
        Ok(outcome) => outcome,
        Err(_) => Err(CallError::Transport(TransportError::Timeout {
            endpoint: uri.to_owned(),
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })),
    }
}

/// 载荷无法解码时，视为线路损坏而非远端的逻辑应答。
pub(crate) fn malformed(uri: &str, detail: impl fmt::Display) -> CallError {
    CallError::Transport(TransportError::Io {
        endpoint: uri.to_owned(),
        detail: format!("malformed response: {detail}"),
    })
}

#[cfg(test)]
mod tests {
    use sheetfed_core::{ErrorKind, Grid};

    use super::*;

    #[test]
    fn binding_is_chosen_by_uri_suffix() {
        assert_eq!(BindingKind::of_uri("http://10.0.0.2:8080/rest"), Some(BindingKind::Rest));
        assert_eq!(BindingKind::of_uri("http://10.0.0.2:8080/soap/"), Some(BindingKind::Soap));
        assert_eq!(BindingKind::of_uri("http://10.0.0.2:8080/grpc"), None);
    }

    #[test]
    fn both_bindings_preserve_error_kinds() {
        let kinds = [
            ErrorKind::BadRequest,
            ErrorKind::NotFound,
            ErrorKind::Forbidden,
            ErrorKind::Conflict,
            ErrorKind::Unavailable,
            ErrorKind::Internal,
        ];
        for binding in [BindingKind::Rest, BindingKind::Soap] {
            for kind in kinds {
                let result: ServiceResult<Grid> = Err(ServiceError::new(kind, "boom"));
                match binding.round_trip("http://beta/x", result) {
                    Err(CallError::Service(err)) => assert_eq!(err.kind(), kind, "{binding}"),
                    other => panic!("{binding}: unexpected {other:?}"),
                }
            }
        }
    }

    #[test]
    fn both_bindings_carry_values() {
        let grid: Grid = vec![vec!["1".to_owned(), "x".to_owned()]];
        for binding in [BindingKind::Rest, BindingKind::Soap] {
            assert_eq!(binding.round_trip("http://beta/x", Ok(grid.clone())), Ok(grid.clone()));
        }
    }
}
