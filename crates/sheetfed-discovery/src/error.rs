use thiserror::Error;

/// 公告报文无法解析的原因。
///
/// 收集循环对这些错误只记 `debug` 日志并丢弃报文，不会中断循环。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AnnouncementError {
    #[error("announcement of {len} bytes exceeds the {max} byte limit")]
    TooLong { len: usize, max: usize },
    #[error("announcement is not valid ASCII text")]
    NotText,
    #[error("expected `domain:service<TAB>uri`, found {found} tab-separated fields")]
    FieldCount { found: usize },
    #[error("expected `domain:service`, found {found} colon-separated fields")]
    KeyFieldCount { found: usize },
    #[error("announcement has an empty {field}")]
    EmptyField { field: &'static str },
    #[error(transparent)]
    UnknownService(#[from] sheetfed_core::endpoint::UnknownService),
}

/// 组播套接字生命周期错误。
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// 创建或配置套接字失败。
    #[error("cannot prepare discovery socket on {addr}: {source}")]
    Socket {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// 加入组播组失败。
    #[error("cannot join multicast group {group}: {source}")]
    Join {
        group: String,
        #[source]
        source: std::io::Error,
    },
}
