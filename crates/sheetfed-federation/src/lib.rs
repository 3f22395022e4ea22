#![deny(unsafe_code)]
#![doc = r#"
# sheetfed-federation

## 模块使命（Why）
- 把发现协议、能力契约与公式引擎装配成一个可部署的域：远端调用先经重试层吸收短暂的传输故障，
  再经缓存层在远端长时间不可达时给出最近一次看到的数据，表格数值总是从定义重新计算。

## 核心契约（What）
- [`retry`]：传输失败按固定间隔重试，逻辑错误立即透传，耗尽后折算为 `Unavailable`；
- [`cache`]：后台周期全量刷新的缓存旁路客户端，只在 `Unavailable` 时回退；
- [`binding`]：REST/SOAP 两种绑定的错误编码、[`binding::Connector`] 与进程内回环网络；
- [`context`]：按域装配并复用客户端，解析跨域引用，统一回收后台任务；
- [`resources`]：Users/Spreadsheets 两类服务端资源；
- [`observability`]：进程级日志安装。

## 实现策略（How）
- 装配顺序固定为“端点 → 原始传输 → 重试 → 缓存”，每层都只依赖 `sheetfed-core` 的 trait。
"#]

pub mod binding;
pub mod cache;
pub mod context;
pub mod imports;
pub mod observability;
pub mod resources;
pub mod retry;

pub use binding::loopback::{LoopbackConnector, LoopbackNetwork};
pub use binding::{BindingKind, Connector};
pub use cache::{CachedSpreadsheetsClient, CachedUsersClient, EntityCache};
pub use context::FederationContext;
pub use imports::{ImportResolver, evaluate_sheet};
pub use resources::{SpreadsheetsResource, UsersResource};
pub use retry::{RetryPolicy, RetrySpreadsheetsClient, RetryUsersClient};
