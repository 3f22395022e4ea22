#![deny(unsafe_code)]
#![doc = r#"
# sheetfed-discovery

## 模块使命（Why）
- 域之间没有中心注册处：每个服务进程通过 UDP 组播宣告自己，并从同一组播组收集其它域的公告，
  据此建立跨域调用所需的 `(domain, service) → uri` 表。

## 核心契约（What）
- [`Announcement`]：报文 `<domain>:<service>\t<uri>` 的严格编解码；
- [`EndpointRegistry`]：首个公告获胜、永不过期的并发端点表；
- [`Discovery`]：过滤自身公告、写入注册表、通知 [`DiscoveryListener`]，并以两个可取消的后台任务
  运行发送与接收循环。

## 实现策略（How）
- 解析与过滤是同步纯逻辑（[`Discovery::observe`]），套接字循环只负责搬运字节，测试因此可以
  不依赖组播网络验证全部协议语义。
"#]

pub mod announcement;
pub mod error;
pub mod multicast;
pub mod registry;

pub use announcement::{Announcement, MAX_ANNOUNCEMENT_LEN};
pub use error::{AnnouncementError, DiscoveryError};
pub use multicast::{Discovery, DiscoveryHandle, DiscoveryListener, Observation};
pub use registry::{EndpointRegistry, Registration};
