//! 时间抽象模块，提供可注入的时钟接口，让重试节律在测试中可观测、可复现。
//!
//! # 结构概览（What）
//! - [`clock::Clock`]：核心 trait，暴露 `sleep` 原语；
//! - [`clock::SystemClock`]：基于 Tokio 的生产实现；
//! - [`clock::RecordingClock`]：立即完成并记录时长的测试实现。

pub mod clock;

pub use clock::{Clock, RecordingClock, Sleep, SystemClock};
