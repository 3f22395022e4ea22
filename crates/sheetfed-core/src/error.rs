//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 用显式的 `Result<T, ServiceError>` 取代跨层抛异常，统一 Users/Spreadsheets 两类服务、
//!   重试层、缓存层与资源层之间的失败语义；
//! - 区分“传输层不可达”与“逻辑结果”两大类：前者是重试与缓存回退的唯一触发条件，
//!   后者必须原样透传。
//!
//! ## 设计要求（What）
//! - [`ErrorKind::Unavailable`] 只用于传输层不可达，其它种类全部是逻辑结果；
//! - [`CallError`] 仅出现在原始传输客户端与重试层之间，重试层之上只会看到 [`ServiceError`]。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 服务调用结果的统一别名。
pub type ServiceResult<T> = Result<T, ServiceError>;

/// 逻辑错误与不可达错误的分类。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 输入格式错误，立即返回，永不重试。
    BadRequest,
    NotFound,
    /// 凭据错误或缺少共享授权。
    Forbidden,
    /// 重复 id、重复共享。
    Conflict,
    /// 传输层不可达；重试耗尽后产生，是缓存回退的唯一入口。
    Unavailable,
    /// 公式求值失败（语法错误、引用环等）。
    Internal,
}

impl ErrorKind {
    /// 稳定的小写名称，用于日志字段与 SOAP fault 编码。
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务层错误：种类 + 可读描述。
///
/// # 教案式说明
/// - **意图 (Why)**：所有能力契约（Users/Spreadsheets）的失败都收敛为该类型，调用方只需按
///   [`ErrorKind`] 分支，不必关心错误来自本地资源还是远端域；
/// - **契约 (What)**：`kind` 决定上层行为（是否回退缓存），`message` 仅供日志与排障；
/// - **风险 (Trade-offs)**：`message` 会跨域传播，禁止在其中写入密码等敏感字段。
#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 是否为传输层不可达。缓存层只在此处返回 `true` 时查询本地缓存。
    pub fn is_unavailable(&self) -> bool {
        self.kind == ErrorKind::Unavailable
    }
}

/// 传输层失败：连接被拒、超时、底层 I/O 错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TransportError {
    #[error("connection refused by `{endpoint}`")]
    ConnectionRefused { endpoint: String },
    #[error("no response from `{endpoint}` within {timeout_ms} ms")]
    Timeout { endpoint: String, timeout_ms: u64 },
    #[error("i/o failure talking to `{endpoint}`: {detail}")]
    Io { endpoint: String, detail: String },
}

/// 原始传输客户端的失败形态。
///
/// - `Transport`：可重试，重试耗尽后折算为 [`ErrorKind::Unavailable`]；
/// - `Service`：远端给出了格式良好的错误响应，立即透传。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl CallError {
    pub fn is_transport(&self) -> bool {
        matches!(self, CallError::Transport(_))
    }
}

impl From<TransportError> for ServiceError {
    fn from(value: TransportError) -> Self {
        ServiceError::unavailable(value.to_string())
    }
}

impl From<CallError> for ServiceError {
    fn from(value: CallError) -> Self {
        match value {
            CallError::Transport(err) => err.into(),
            CallError::Service(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_become_unavailable() {
        let err: ServiceError = CallError::from(TransportError::ConnectionRefused {
            endpoint: "http://10.0.0.1:8080/rest".to_owned(),
        })
        .into();
        assert!(err.is_unavailable());
    }

    #[test]
    fn logical_failures_keep_their_kind() {
        let err: ServiceError = CallError::from(ServiceError::forbidden("bad password")).into();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "forbidden: bad password");
    }
}
