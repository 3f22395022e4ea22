#![deny(unsafe_code)]
#![doc = "sheetfed-core: 联邦表格服务的核心契约。"]
#![doc = ""]
#![doc = "本 crate 不做任何网络 I/O：它定义错误分类（`Result<T>` 契约）、用户与表格模型、"]
#![doc = "Users/Spreadsheets 两类能力 trait、公式引擎，以及上层共享的时钟、后台任务与配置。"]
#![doc = "发现协议位于 `sheetfed-discovery`，重试/缓存/资源编排位于 `sheetfed-federation`。"]

pub use async_trait::async_trait;

pub mod cell;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod model;
pub mod service;
pub mod task;
pub mod time;

pub use cell::{CellError, CellId, CellRange, Grid};
pub use config::{ConfigError, FederationConfig};
pub use endpoint::{ServiceEndpoint, ServiceName};
pub use engine::{EngineError, FormulaEngine, ImportRef, ImportedValues, StandardEngine};
pub use error::{CallError, ErrorKind, ServiceError, ServiceResult, TransportError};
pub use model::{DomainId, MAX_CELLS, Spreadsheet, User, UserPatch, qualified_user};
pub use service::{SpreadsheetsService, SpreadsheetsTransport, UsersService, UsersTransport};
pub use task::{BackgroundTask, StopSignal, spawn_periodic};
pub use time::{Clock, RecordingClock, SystemClock};
